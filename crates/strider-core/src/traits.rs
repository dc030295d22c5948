use nalgebra::{DMatrix, DVector, Isometry3};

use crate::error::ModelError;
use crate::types::{ControlMode, LinkId, StreamInput, Telemetry};

// ---------------------------------------------------------------------------
// RobotModel
// ---------------------------------------------------------------------------

/// Kinematics engine and actuation interface of the robot.
///
/// Joint vectors passed in and out are ordered by increasing global joint
/// index over the currently active joints (`n` entries). Jacobians have
/// `6 + n` columns: floating-base velocity first (linear, angular), then the
/// active joints.
pub trait RobotModel: Send + 'static {
    /// Resolve a link by name.
    fn link_id(&self, name: &str) -> Option<LinkId>;

    /// Read active joint positions. `blocking` waits for a fresh sample.
    fn read_positions(&mut self, blocking: bool) -> Result<DVector<f64>, ModelError>;

    /// Read active joint velocities. `blocking` waits for a fresh sample.
    fn read_velocities(&mut self, blocking: bool) -> Result<DVector<f64>, ModelError>;

    /// Pose of `link` expressed in the base frame.
    fn link_transform(&self, q: &DVector<f64>, link: LinkId) -> Isometry3<f64>;

    /// Pose of `link` in the world frame given the base pose.
    fn forward_kinematics(
        &self,
        q: &DVector<f64>,
        base: &Isometry3<f64>,
        link: LinkId,
    ) -> Isometry3<f64>;

    /// Geometric Jacobian of `link` (6 × (6 + n), linear rows first).
    fn jacobian(&self, q: &DVector<f64>, base: &Isometry3<f64>, link: LinkId) -> DMatrix<f64>;

    /// Write a joint-velocity reference (n entries).
    fn set_velocity_reference(&mut self, dq: &DVector<f64>) -> Result<(), ModelError>;

    /// Switch the low-level control mode of all active joints.
    fn set_control_mode(&mut self, mode: ControlMode) -> Result<(), ModelError>;

    /// Global indices of the active joints, ascending.
    fn joint_list(&self) -> Vec<usize>;

    /// Activate the joint with global index `id`.
    fn add_joint(&mut self, id: usize) -> Result<(), ModelError>;

    /// Deactivate the joint with global index `id`.
    fn remove_joint(&mut self, id: usize) -> Result<(), ModelError>;
}

// ---------------------------------------------------------------------------
// StreamTransport
// ---------------------------------------------------------------------------

/// Two-way streaming side of the parameter transport.
pub trait StreamTransport: Send + 'static {
    /// Latest desired values, if any arrived since the previous tick.
    fn read_inputs(&mut self) -> Option<StreamInput>;

    /// Publish the tick's telemetry.
    fn publish(&mut self, telemetry: &Telemetry);
}

/// Transport that never delivers input and drops telemetry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl StreamTransport for NullTransport {
    fn read_inputs(&mut self) -> Option<StreamInput> {
        None
    }

    fn publish(&mut self, _telemetry: &Telemetry) {}
}
