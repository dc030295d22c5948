//! Deterministic in-process robot for closed-loop testing of the Strider
//! whole-body controller.
//!
//! [`SimRobot`] implements [`RobotModel`](strider_core::traits::RobotModel)
//! with a linearized floating-base kinematic model whose Jacobians are seeded
//! random maps. It logs every command and mode switch, and can inject read
//! and write failures.
//!
//! # Example
//!
//! ```
//! use strider_core::traits::RobotModel;
//! use strider_sim::{SimConfig, SimRobot};
//!
//! let mut robot = SimRobot::new(SimConfig { full_dofs: 12, ..SimConfig::default() });
//! let q = robot.read_positions(true).unwrap();
//! assert_eq!(q.len(), 12);
//! ```

pub mod robot;

pub use robot::{SimConfig, SimRobot};
