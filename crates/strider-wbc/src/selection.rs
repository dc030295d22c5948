//! Selection matrix mapping the active-joint subspace into the full joint
//! superset.
//!
//! `S` is `n × D`: row `j` holds a single 1 at the global index of the `j`-th
//! active joint, rows ordered by increasing global index. `S·v` projects a
//! full-superset vector onto the active joints, `Sᵀ·u` scatters an active
//! vector back (zeros at inactive joints).

use nalgebra::{DMatrix, DVector};

use strider_core::error::DimensionError;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionMatrix {
    matrix: DMatrix<f64>,
    active: Vec<usize>,
}

impl SelectionMatrix {
    /// Build from an active-joint mask over the full superset.
    pub fn from_mask(mask: &[bool]) -> Self {
        let active: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i))
            .collect();
        let mut matrix = DMatrix::zeros(active.len(), mask.len());
        for (row, &col) in active.iter().enumerate() {
            matrix[(row, col)] = 1.0;
        }
        Self { matrix, active }
    }

    /// Active joint count `n`.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Full superset size `D`.
    pub fn full_dofs(&self) -> usize {
        self.matrix.ncols()
    }

    /// Global indices of the active joints, ascending.
    pub fn active_indices(&self) -> &[usize] {
        &self.active
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// `S · full`: pick the active entries of a full-superset vector.
    pub fn project(&self, full: &DVector<f64>) -> Result<DVector<f64>, DimensionError> {
        DimensionError::check("selection project input", self.full_dofs(), full.len())?;
        Ok(DVector::from_iterator(
            self.active.len(),
            self.active.iter().map(|&i| full[i]),
        ))
    }

    /// `Sᵀ · reduced`: scatter an active vector into the full superset.
    pub fn expand(&self, reduced: &DVector<f64>) -> Result<DVector<f64>, DimensionError> {
        DimensionError::check("selection expand input", self.active_count(), reduced.len())?;
        let mut full = DVector::zeros(self.full_dofs());
        for (j, &i) in self.active.iter().enumerate() {
            full[i] = reduced[j];
        }
        Ok(full)
    }

    /// Overwrite the active entries of `full` with `reduced`, keeping the
    /// inactive ones.
    pub fn merge_into(
        &self,
        reduced: &DVector<f64>,
        full: &mut DVector<f64>,
    ) -> Result<(), DimensionError> {
        DimensionError::check("selection merge input", self.active_count(), reduced.len())?;
        DimensionError::check("selection merge target", self.full_dofs(), full.len())?;
        for (j, &i) in self.active.iter().enumerate() {
            full[i] = reduced[j];
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strider_test_utils::scenario_mask;

    #[test]
    fn one_entry_per_row_at_global_index() {
        let mask = scenario_mask();
        let s = SelectionMatrix::from_mask(&mask);
        assert_eq!(s.matrix().nrows(), 25);
        assert_eq!(s.matrix().ncols(), 32);

        for (row, &global) in s.active_indices().iter().enumerate() {
            let ones: Vec<usize> = (0..32).filter(|&c| s.matrix()[(row, c)] == 1.0).collect();
            assert_eq!(ones, vec![global]);
            assert_relative_eq!(s.matrix().row(row).sum(), 1.0);
        }
        for col in 0..32 {
            assert!(s.matrix().column(col).sum() <= 1.0);
        }
    }

    #[test]
    fn rows_follow_increasing_global_index() {
        let s = SelectionMatrix::from_mask(&scenario_mask());
        assert!(s.active_indices().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn s_st_is_identity() {
        let s = SelectionMatrix::from_mask(&scenario_mask());
        let sst = s.matrix() * s.matrix().transpose();
        assert_relative_eq!(sst, DMatrix::identity(25, 25));
    }

    #[test]
    fn stable_for_same_mask() {
        let mask = scenario_mask();
        assert_eq!(SelectionMatrix::from_mask(&mask), SelectionMatrix::from_mask(&mask));
    }

    #[test]
    fn project_and_expand() {
        let mask = [true, false, true, true, false];
        let s = SelectionMatrix::from_mask(&mask);
        let full = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]);

        let reduced = s.project(&full).unwrap();
        assert_eq!(reduced.as_slice(), &[1.0, 3.0, 4.0]);
        assert_relative_eq!(reduced, s.matrix() * &full);

        let back = s.expand(&reduced).unwrap();
        assert_eq!(back.as_slice(), &[1.0, 0.0, 3.0, 4.0, 0.0]);
    }

    #[test]
    fn merge_keeps_inactive_entries() {
        let s = SelectionMatrix::from_mask(&[false, true, false]);
        let mut full = DVector::from_vec(vec![7.0, 8.0, 9.0]);
        s.merge_into(&DVector::from_vec(vec![-1.0]), &mut full).unwrap();
        assert_eq!(full.as_slice(), &[7.0, -1.0, 9.0]);
    }

    #[test]
    fn wrong_sizes_are_rejected() {
        let s = SelectionMatrix::from_mask(&[true, true, false]);
        assert!(s.project(&DVector::zeros(2)).is_err());
        assert!(s.expand(&DVector::zeros(3)).is_err());
    }

    #[test]
    fn empty_mask() {
        let s = SelectionMatrix::from_mask(&[false; 4]);
        assert_eq!(s.active_count(), 0);
        assert_eq!(s.full_dofs(), 4);
    }
}
