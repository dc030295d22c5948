//! SO(3) helpers shared by the controller and the simulated robot.

use nalgebra::{Matrix3, Vector3};

/// Cross-product matrix: `skew(a) · b == a × b`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Left Jacobian of SO(3) at rotation vector `phi`.
///
/// Maps the rate of a rotation vector to the world-frame angular velocity of
/// `exp(phi)`.
pub fn so3_left_jacobian(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();
    let k = skew(phi);
    let k2 = k * k;
    if theta < 1e-6 {
        return Matrix3::identity() + 0.5 * k + k2 / 6.0;
    }
    let t2 = theta * theta;
    Matrix3::identity() + (1.0 - theta.cos()) / t2 * k + (theta - theta.sin()) / (t2 * theta) * k2
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    #[test]
    fn skew_is_cross_product() {
        let a = Vector3::new(0.3, -1.0, 2.0);
        let b = Vector3::new(-0.5, 0.25, 1.5);
        assert_relative_eq!(skew(&a) * b, a.cross(&b), epsilon = 1e-12);
    }

    #[test]
    fn left_jacobian_matches_finite_difference() {
        let phi = Vector3::new(0.4, -0.2, 0.7);
        let dphi = Vector3::new(0.1, 0.3, -0.2);
        let h = 1e-6;

        let r0 = UnitQuaternion::from_scaled_axis(phi);
        let r1 = UnitQuaternion::from_scaled_axis(phi + h * dphi);
        let omega = (r1 * r0.inverse()).scaled_axis() / h;

        assert_relative_eq!(so3_left_jacobian(&phi) * dphi, omega, epsilon = 1e-5);
    }

    #[test]
    fn small_angle_branch_is_continuous() {
        let phi = Vector3::new(1e-7, 0.0, 0.0);
        let phi_big = Vector3::new(1e-5, 0.0, 0.0);
        assert_relative_eq!(
            so3_left_jacobian(&phi),
            so3_left_jacobian(&phi_big),
            epsilon = 1e-5
        );
    }
}
