//! Shared value types: support phase, control modes, stream input and
//! telemetry records.

use serde::{Deserialize, Serialize};

/// Number of virtual floating-base velocity coordinates preceding the joint
/// velocities in every Jacobian and in the full velocity vector.
pub const BASE_DOFS: usize = 6;

/// Rows contributed by one foot contact (linear + angular).
pub const FOOT_CONSTRAINT_ROWS: usize = 6;

/// Planar CoM task dimension (x, y).
pub const COM_TASK_DIM: usize = 2;

/// Foot task dimension (position + rotation vector).
pub const FOOT_TASK_DIM: usize = 6;

// ---------------------------------------------------------------------------
// SupportPhase
// ---------------------------------------------------------------------------

/// Which feet are in ground contact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportPhase {
    /// Both feet on the ground.
    #[default]
    Double,
    /// Standing on the left foot; the right foot swings.
    Left,
    /// Standing on the right foot; the left foot swings.
    Right,
}

impl SupportPhase {
    /// Contact constraint row count `k`: 12 in double support, 6 otherwise.
    pub const fn constraint_rows(self) -> usize {
        match self {
            Self::Double => 2 * FOOT_CONSTRAINT_ROWS,
            Self::Left | Self::Right => FOOT_CONSTRAINT_ROWS,
        }
    }

    /// Foot whose pose is tracked by the foot task (and reported in telemetry).
    pub const fn controlled_foot(self) -> Foot {
        match self {
            Self::Left => Foot::Right,
            Self::Double | Self::Right => Foot::Left,
        }
    }

    /// Foot that anchors the world frame.
    pub const fn anchor_foot(self) -> Foot {
        match self {
            Self::Right => Foot::Right,
            Self::Double | Self::Left => Foot::Left,
        }
    }
}

/// A foot of a biped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Foot {
    Left,
    Right,
}

// ---------------------------------------------------------------------------
// ControlMode / ControllerStatus
// ---------------------------------------------------------------------------

/// Low-level actuation mode requested from the robot interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Joints hold their current position.
    #[default]
    Position,
    /// Joints track a velocity reference.
    Velocity,
}

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerStatus {
    /// State is read and telemetry published, but nothing is commanded.
    #[default]
    Off,
    /// The hierarchy solver runs and commands reach actuation.
    On,
}

// ---------------------------------------------------------------------------
// LinkId
// ---------------------------------------------------------------------------

/// Opaque link handle resolved by name from the robot model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub usize);

// ---------------------------------------------------------------------------
// StreamInput
// ---------------------------------------------------------------------------

/// Desired task values streamed in at the start of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInput {
    /// Desired planar CoM position [x, y] (m).
    pub com: [f64; COM_TASK_DIM],
    /// Desired controlled-foot pose: position (m) then rotation vector (rad).
    pub foot: [f64; FOOT_TASK_DIM],
    /// Desired posture over the full joint superset (rad).
    pub posture: Vec<f64>,
}

impl StreamInput {
    /// Zero targets for a superset of `full_dofs` joints.
    pub fn zeros(full_dofs: usize) -> Self {
        Self {
            com: [0.0; COM_TASK_DIM],
            foot: [0.0; FOOT_TASK_DIM],
            posture: vec![0.0; full_dofs],
        }
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Monitoring record published at the end of every tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Tick index since construction.
    pub tick: u64,
    pub status: ControllerStatus,
    pub support_phase: SupportPhase,
    /// Active joint count `n`.
    pub active_joints: usize,
    /// Contact constraint rows `k`.
    pub constraint_rows: usize,
    pub com: [f64; COM_TASK_DIM],
    pub com_reference: [f64; COM_TASK_DIM],
    pub foot: [f64; FOOT_TASK_DIM],
    pub foot_reference: [f64; FOOT_TASK_DIM],
    /// Measured active joint positions (n).
    pub joint_positions: Vec<f64>,
    /// Posture reference over the full superset (D).
    pub posture_reference: Vec<f64>,
    /// Last joint-velocity command (n). Zero while off.
    pub joint_velocity_command: Vec<f64>,
    /// CoM velocity requested from the solver.
    pub com_velocity_commanded: [f64; COM_TASK_DIM],
    /// CoM velocity produced by the solver output (`Jcom · dq_des`).
    pub com_velocity_achieved: [f64; COM_TASK_DIM],
    /// `‖J_right · dq‖` from the measured velocity.
    pub right_foot_speed: f64,
    /// `‖J_left · dq‖` from the measured velocity.
    pub left_foot_speed: f64,
    /// `‖Jc · dq_des‖` of the last solve.
    pub contact_residual: f64,
}
