//! Task-priority whole-body velocity controller for a floating-base biped.
//!
//! Each control period the controller turns desired CoM, swing-foot and
//! posture values into a joint-velocity command:
//!
//! 1. **State assembly**: read the joints, anchor the world frame on a stance
//!    foot, evaluate forward kinematics and Jacobians, estimate the base
//!    velocity from the contact constraints
//! 2. **Reference generation**: minimum-jerk smoothing of the desired values
//! 3. **Feedback**: reference velocity plus proportional correction per task
//! 4. **Hierarchy solve**: contact ≻ CoM ≻ foot ≻ posture by cascaded
//!    nullspace projection with truncated (and damped) pseudoinverses
//!
//! # Architecture
//!
//! A single [`Controller`] owns every buffer sized by the active joint count
//! `n` and the contact row count `k`. Both change at runtime through
//! [`Controller::reconfigure`], strictly between ticks. The periodic thread
//! ([`ControlLoop`]) and the parameter side share the controller behind one
//! mutex.

pub mod assembler;
pub mod controller;
pub mod jacobians;
pub mod params;
pub mod pinv;
pub mod pose;
pub mod reconfig;
pub mod runner;
pub mod selection;
pub mod solver;
pub mod trajectory;

pub use assembler::{LinkIds, RobotState, StateAssembler};
pub use controller::Controller;
pub use jacobians::{JacobianSet, posture_jacobian};
pub use params::{CommandId, Event, ParamId, ParamUpdate};
pub use pinv::{DampedPinv, pinv_damp_trunc, pinv_trunc, solve_trunc};
pub use pose::{pose_error, pose_rate_to_twist, pose_to_vector, vector_to_pose};
pub use reconfig::{ActiveSet, Dimensions, ReconfigEvent, ReconfigOutcome};
pub use runner::{ControlLoop, LoopStats, LoopSummary, SharedController, shared};
pub use selection::SelectionMatrix;
pub use solver::{SolverOutput, TaskHierarchySolver, TaskTargets};
pub use trajectory::{
    DesiredTargets, MinJerkTrajGen, ReferenceTrajectories, TaskReferences, TrajectoryTask,
};
