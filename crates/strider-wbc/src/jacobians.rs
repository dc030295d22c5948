//! Block layout of the task Jacobians consumed by the hierarchy solver.
//!
//! Every Jacobian has `m = n + 6` columns (base first). Buffers are allocated
//! at the exact current `n`/`k` by reconfiguration and refilled each tick.

use nalgebra::DMatrix;

use strider_core::error::DimensionError;
use strider_core::types::{BASE_DOFS, COM_TASK_DIM, FOOT_CONSTRAINT_ROWS, FOOT_TASK_DIM};

#[derive(Debug, Clone, PartialEq)]
pub struct JacobianSet {
    /// Contact stack `Jc` (k × m).
    pub contact: DMatrix<f64>,
    /// Planar CoM rows (2 × m).
    pub com: DMatrix<f64>,
    /// Controlled-foot task (6 × m). Zero in double support.
    pub foot: DMatrix<f64>,
    /// Posture task `[0 | I_n]` (n × m).
    pub posture: DMatrix<f64>,
    /// Raw right-foot Jacobian (6 × m).
    pub right_foot: DMatrix<f64>,
    /// Raw left-foot Jacobian (6 × m).
    pub left_foot: DMatrix<f64>,
}

impl JacobianSet {
    /// Allocate zeroed buffers for `n` active joints and `k` contact rows.
    pub fn allocate(n: usize, k: usize) -> Self {
        let m = n + BASE_DOFS;
        Self {
            contact: DMatrix::zeros(k, m),
            com: DMatrix::zeros(COM_TASK_DIM, m),
            foot: DMatrix::zeros(FOOT_TASK_DIM, m),
            posture: posture_jacobian(n),
            right_foot: DMatrix::zeros(FOOT_CONSTRAINT_ROWS, m),
            left_foot: DMatrix::zeros(FOOT_CONSTRAINT_ROWS, m),
        }
    }

    /// Active joint count `n`.
    pub fn joints(&self) -> usize {
        self.posture.nrows()
    }

    /// Full velocity dimension `m = n + 6`.
    pub fn velocity_dim(&self) -> usize {
        self.posture.ncols()
    }

    /// Contact rows `k`.
    pub fn constraint_rows(&self) -> usize {
        self.contact.nrows()
    }

    /// Reallocate every buffer for `n` active joints, keeping `k`.
    pub fn resize_joints(&mut self, n: usize) {
        *self = Self::allocate(n, self.constraint_rows());
    }

    /// Reallocate the contact stack for `k` rows, keeping `n`.
    pub fn resize_constraints(&mut self, k: usize) {
        self.contact = DMatrix::zeros(k, self.velocity_dim());
    }

    /// Check the internal block layout.
    pub fn validate(&self) -> Result<(), DimensionError> {
        let n = self.joints();
        let m = self.velocity_dim();
        DimensionError::check("Jposture columns", n + BASE_DOFS, m)?;
        DimensionError::check("Jc columns", m, self.contact.ncols())?;
        DimensionError::check("Jcom rows", COM_TASK_DIM, self.com.nrows())?;
        DimensionError::check("Jcom columns", m, self.com.ncols())?;
        DimensionError::check("Jfoot rows", FOOT_TASK_DIM, self.foot.nrows())?;
        DimensionError::check("Jfoot columns", m, self.foot.ncols())?;
        let k = self.constraint_rows();
        if k != FOOT_CONSTRAINT_ROWS && k != 2 * FOOT_CONSTRAINT_ROWS {
            return Err(DimensionError::new("Jc rows", FOOT_CONSTRAINT_ROWS, k));
        }
        Ok(())
    }
}

/// `[0_{n×6} | I_n]`: selects the joint part of the full velocity vector.
pub fn posture_jacobian(n: usize) -> DMatrix<f64> {
    let mut j = DMatrix::zeros(n, n + BASE_DOFS);
    j.view_mut((0, BASE_DOFS), (n, n)).fill_with_identity();
    j
}
