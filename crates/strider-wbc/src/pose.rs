//! Conversions between rigid poses and the 6-D task coordinates
//! `[x, y, z, rx, ry, rz]` (position + rotation vector).

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3, Vector6};

use strider_core::so3::so3_left_jacobian;

/// Pose → `[position, rotation vector]`.
pub fn pose_to_vector(pose: &Isometry3<f64>) -> Vector6<f64> {
    let p = pose.translation.vector;
    let r = pose.rotation.scaled_axis();
    Vector6::new(p.x, p.y, p.z, r.x, r.y, r.z)
}

/// `[position, rotation vector]` → pose.
pub fn vector_to_pose(v: &Vector6<f64>) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::new(v[0], v[1], v[2]),
        UnitQuaternion::from_scaled_axis(Vector3::new(v[3], v[4], v[5])),
    )
}

/// 6-D error that drives `current` toward `reference`.
///
/// Linear part: `p_ref − p`. Angular part: rotation vector of
/// `R_ref · Rᵀ`, i.e. the world-frame rotation taking the current
/// orientation onto the reference.
pub fn pose_error(current: &Isometry3<f64>, reference: &Isometry3<f64>) -> Vector6<f64> {
    let dp = reference.translation.vector - current.translation.vector;
    let dr = (reference.rotation * current.rotation.inverse()).scaled_axis();
    Vector6::new(dp.x, dp.y, dp.z, dr.x, dr.y, dr.z)
}

/// Twist `[v, ω]` of a pose moving along `pose` at coordinate rate `rate`.
///
/// The linear part passes through. The angular part maps the rotation-vector
/// rate to world-frame angular velocity through the SO(3) left Jacobian.
pub fn pose_rate_to_twist(pose: &Vector6<f64>, rate: &Vector6<f64>) -> Vector6<f64> {
    let phi = Vector3::new(pose[3], pose[4], pose[5]);
    let dphi = Vector3::new(rate[3], rate[4], rate[5]);
    let w = so3_left_jacobian(&phi) * dphi;
    Vector6::new(rate[0], rate[1], rate[2], w.x, w.y, w.z)
}
