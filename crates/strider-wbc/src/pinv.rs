//! Truncated and damped pseudoinverses via SVD.
//!
//! With `A = U Σ Vᵀ`:
//! - truncated: `A⁺ = V Σ⁺ Uᵀ`, `σ⁺ = 1/σ` for `σ > tol`, 0 otherwise
//! - damped truncated: `σ⁺ = σ / (σ² + λ²)` for `σ > tol`, 0 otherwise
//!
//! Directions with `σ <= tol` are dropped instead of amplified.

use nalgebra::{DMatrix, DVector};

use strider_core::error::ControlError;

/// Undamped and damped truncated pseudoinverses of the same matrix.
#[derive(Debug, Clone)]
pub struct DampedPinv {
    /// Undamped truncated pseudoinverse (used for nullspace updates).
    pub pinv: DMatrix<f64>,
    /// Damped truncated pseudoinverse (used for the task command).
    pub damped: DMatrix<f64>,
    pub singular_values: DVector<f64>,
}

/// Truncated pseudoinverse of `a`, plus its singular values.
pub fn pinv_trunc(
    a: &DMatrix<f64>,
    tol: f64,
    label: &'static str,
) -> Result<(DMatrix<f64>, DVector<f64>), ControlError> {
    let (u, sv, v_t) = decompose(a, label)?;
    let inv = sv.map(|s| if s > tol { 1.0 / s } else { 0.0 });
    Ok((assemble(&u, &inv, &v_t), sv))
}

/// Damped and undamped truncated pseudoinverses of `a` from one SVD.
pub fn pinv_damp_trunc(
    a: &DMatrix<f64>,
    tol: f64,
    damping: f64,
    label: &'static str,
) -> Result<DampedPinv, ControlError> {
    let (u, sv, v_t) = decompose(a, label)?;
    let d2 = damping * damping;
    let inv = sv.map(|s| if s > tol { 1.0 / s } else { 0.0 });
    let inv_damped = sv.map(|s| if s > tol { s / (s * s + d2) } else { 0.0 });
    Ok(DampedPinv {
        pinv: assemble(&u, &inv, &v_t),
        damped: assemble(&u, &inv_damped, &v_t),
        singular_values: sv,
    })
}

/// Least-squares solution of `a · x = b` through the truncated pseudoinverse.
pub fn solve_trunc(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    tol: f64,
    label: &'static str,
) -> Result<DVector<f64>, ControlError> {
    let (pinv, _) = pinv_trunc(a, tol, label)?;
    Ok(pinv * b)
}

type Decomposition = (DMatrix<f64>, DVector<f64>, DMatrix<f64>);

fn decompose(a: &DMatrix<f64>, label: &'static str) -> Result<Decomposition, ControlError> {
    if a.is_empty() {
        return Ok((
            DMatrix::zeros(a.nrows(), 0),
            DVector::zeros(0),
            DMatrix::zeros(0, a.ncols()),
        ));
    }
    // The iterative SVD does not terminate reliably on non-finite input
    if a.iter().any(|x| !x.is_finite()) {
        return Err(ControlError::Svd(label));
    }
    let svd = a.clone().svd(true, true);
    let u = svd.u.ok_or(ControlError::Svd(label))?;
    let v_t = svd.v_t.ok_or(ControlError::Svd(label))?;
    Ok((u, svd.singular_values, v_t))
}

/// `V · diag(inv) · Uᵀ`
fn assemble(u: &DMatrix<f64>, inv: &DVector<f64>, v_t: &DMatrix<f64>) -> DMatrix<f64> {
    let mut v_scaled = v_t.transpose();
    for (mut col, &s) in v_scaled.column_iter_mut().zip(inv.iter()) {
        col *= s;
    }
    v_scaled * u.transpose()
}
