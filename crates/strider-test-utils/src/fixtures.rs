//! Seeded random matrices and reference joint masks.

use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::rng::seeded_rng;

/// Matrix with entries uniform in `[-1, 1)`, reproducible from `seed`.
///
/// Random dense Jacobians are full rank with probability one, which makes
/// them a good stand-in for a non-singular robot configuration.
pub fn random_matrix(rows: usize, cols: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = seeded_rng(seed);
    DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-1.0..1.0))
}

/// Vector with entries uniform in `[-1, 1)`, reproducible from `seed`.
pub fn random_vector(len: usize, seed: u64) -> DVector<f64> {
    let mut rng = seeded_rng(seed);
    DVector::from_fn(len, |_, _| rng.gen_range(-1.0..1.0))
}

/// 32-joint superset with 25 active joints (indices 3, 4, 10, 17, 18, 29, 31
/// inactive).
pub fn scenario_mask() -> Vec<bool> {
    const INACTIVE: [usize; 7] = [3, 4, 10, 17, 18, 29, 31];
    (0..32).map(|i| !INACTIVE.contains(&i)).collect()
}

/// Assert `‖j · v‖ < eps · max(1, ‖v‖)`.
#[track_caller]
pub fn assert_annihilates(j: &DMatrix<f64>, v: &DVector<f64>, eps: f64) {
    let residual = (j * v).norm();
    let bound = eps * v.norm().max(1.0);
    assert!(
        residual < bound,
        "‖J·v‖ = {residual:e} exceeds {bound:e} (‖v‖ = {:e})",
        v.norm()
    );
}
