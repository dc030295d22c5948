//! Per-tick robot state assembly.
//!
//! Reads joint positions and velocities, anchors the world frame on a stance
//! foot, evaluates forward kinematics and the foot/CoM Jacobians, stacks the
//! contact constraints for the current support phase and estimates the
//! floating-base velocity from the joint velocities.

use nalgebra::{DMatrix, DVector, Isometry3, Vector2, Vector6};
use tracing::{debug, warn};

use strider_core::config::LinkNames;
use strider_core::error::{ControlError, DimensionError, InitError, ModelError};
use strider_core::traits::RobotModel;
use strider_core::types::{
    BASE_DOFS, COM_TASK_DIM, FOOT_CONSTRAINT_ROWS, Foot, LinkId, SupportPhase,
};

use crate::jacobians::JacobianSet;
use crate::pinv::solve_trunc;
use crate::pose::pose_to_vector;

// ---------------------------------------------------------------------------
// LinkIds
// ---------------------------------------------------------------------------

/// Link handles resolved once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkIds {
    pub right_foot: LinkId,
    pub left_foot: LinkId,
    pub com: LinkId,
}

impl LinkIds {
    pub fn resolve<R: RobotModel>(robot: &R, names: &LinkNames) -> Result<Self, InitError> {
        let find = |name: &str| {
            robot
                .link_id(name)
                .ok_or_else(|| InitError::MissingLink(name.to_owned()))
        };
        Ok(Self {
            right_foot: find(&names.right_foot)?,
            left_foot: find(&names.left_foot)?,
            com: find(&names.com)?,
        })
    }

    pub const fn foot(&self, foot: Foot) -> LinkId {
        match foot {
            Foot::Left => self.left_foot,
            Foot::Right => self.right_foot,
        }
    }
}

// ---------------------------------------------------------------------------
// RobotState
// ---------------------------------------------------------------------------

/// Measured state of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotState {
    /// Active joint positions (n).
    pub q: DVector<f64>,
    /// Active joint velocities (n).
    pub dq_joints: DVector<f64>,
    /// Estimated full velocity: base twist then joints (n + 6).
    pub dq: DVector<f64>,
    /// Base pose in the world (stance-foot) frame.
    pub base: Isometry3<f64>,
    pub support: SupportPhase,
    /// Planar CoM position.
    pub com: Vector2<f64>,
    /// Controlled-foot pose.
    pub foot: Isometry3<f64>,
    pub right_foot: Isometry3<f64>,
    pub left_foot: Isometry3<f64>,
}

impl RobotState {
    /// Controlled-foot pose as `[position, rotation vector]`.
    pub fn foot_vector(&self) -> Vector6<f64> {
        pose_to_vector(&self.foot)
    }
}

#[derive(Debug, Clone)]
struct Sample {
    q: DVector<f64>,
    dq: DVector<f64>,
}

// ---------------------------------------------------------------------------
// StateAssembler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StateAssembler {
    links: LinkIds,
    last: Option<Sample>,
    degraded_reads: u64,
}

impl StateAssembler {
    pub const fn new(links: LinkIds) -> Self {
        Self {
            links,
            last: None,
            degraded_reads: 0,
        }
    }

    pub const fn links(&self) -> &LinkIds {
        &self.links
    }

    /// Number of ticks that ran on a reused sample or skipped control.
    pub const fn degraded_reads(&self) -> u64 {
        self.degraded_reads
    }

    /// Drop the cached sample (its size no longer matches after a joint
    /// change).
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    /// Read the robot and fill `jacobians` in place.
    ///
    /// A blocking read that fails is an error. A non-blocking read that fails
    /// reuses the previous sample when its size still matches, otherwise
    /// returns `Ok(None)` so the caller skips control for this tick.
    pub fn assemble<R: RobotModel>(
        &mut self,
        robot: &mut R,
        support: SupportPhase,
        jacobians: &mut JacobianSet,
        pinv_tolerance: f64,
        blocking: bool,
    ) -> Result<Option<RobotState>, ControlError> {
        let n = jacobians.joints();
        let Some(sample) = self.read(robot, n, blocking)? else {
            return Ok(None);
        };
        DimensionError::check("measured joint positions", n, sample.q.len())?;
        DimensionError::check("measured joint velocities", n, sample.dq.len())?;
        DimensionError::check("Jc rows", support.constraint_rows(), jacobians.constraint_rows())?;

        let q = &sample.q;
        let anchor = self.links.foot(support.anchor_foot());
        let base = robot.link_transform(q, anchor).inverse();

        let right_foot = robot.forward_kinematics(q, &base, self.links.right_foot);
        let left_foot = robot.forward_kinematics(q, &base, self.links.left_foot);
        let com_pose = robot.forward_kinematics(q, &base, self.links.com);

        let m = n + BASE_DOFS;
        let j_right = robot.jacobian(q, &base, self.links.right_foot);
        let j_left = robot.jacobian(q, &base, self.links.left_foot);
        let j_com = robot.jacobian(q, &base, self.links.com);
        check_link_jacobian("right foot Jacobian", &j_right, m)?;
        check_link_jacobian("left foot Jacobian", &j_left, m)?;
        check_link_jacobian("CoM Jacobian", &j_com, m)?;

        jacobians.right_foot.copy_from(&j_right);
        jacobians.left_foot.copy_from(&j_left);
        jacobians.com.copy_from(&j_com.rows(0, COM_TASK_DIM));
        match support {
            SupportPhase::Double => {
                jacobians.foot.fill(0.0);
                jacobians
                    .contact
                    .rows_mut(0, FOOT_CONSTRAINT_ROWS)
                    .copy_from(&j_right);
                jacobians
                    .contact
                    .rows_mut(FOOT_CONSTRAINT_ROWS, FOOT_CONSTRAINT_ROWS)
                    .copy_from(&j_left);
            }
            SupportPhase::Left => {
                jacobians.foot.copy_from(&j_right);
                jacobians.contact.copy_from(&j_left);
            }
            SupportPhase::Right => {
                jacobians.foot.copy_from(&j_left);
                jacobians.contact.copy_from(&j_right);
            }
        }

        // Stance feet do not move: Jc_base · v_b + Jc_joints · dq_J = 0
        let jc_base = jacobians.contact.columns(0, BASE_DOFS).into_owned();
        let rhs = -(jacobians.contact.columns(BASE_DOFS, n) * &sample.dq);
        let base_velocity = solve_trunc(&jc_base, &rhs, pinv_tolerance, "contact base block")?;

        let mut dq = DVector::zeros(m);
        dq.rows_mut(0, BASE_DOFS).copy_from(&base_velocity);
        dq.rows_mut(BASE_DOFS, n).copy_from(&sample.dq);

        let foot = match support.controlled_foot() {
            Foot::Left => left_foot,
            Foot::Right => right_foot,
        };

        debug!(
            "strider-wbc: state assembled ({support:?}, {n} joints, base speed {:.3e})",
            base_velocity.norm()
        );

        Ok(Some(RobotState {
            q: sample.q,
            dq_joints: sample.dq,
            dq,
            base,
            support,
            com: Vector2::new(com_pose.translation.x, com_pose.translation.y),
            foot,
            right_foot,
            left_foot,
        }))
    }

    fn read<R: RobotModel>(
        &mut self,
        robot: &mut R,
        n: usize,
        blocking: bool,
    ) -> Result<Option<Sample>, ControlError> {
        match read_sample(robot, blocking) {
            Ok(sample) => {
                self.last = Some(sample.clone());
                Ok(Some(sample))
            }
            Err(err) if blocking => Err(err.into()),
            Err(err) => {
                self.degraded_reads += 1;
                match &self.last {
                    Some(last) if last.q.len() == n && last.dq.len() == n => {
                        warn!("strider-wbc: state read failed, reusing previous sample: {err}");
                        Ok(Some(last.clone()))
                    }
                    _ => {
                        warn!("strider-wbc: state read failed, no usable sample: {err}");
                        Ok(None)
                    }
                }
            }
        }
    }
}

fn read_sample<R: RobotModel>(robot: &mut R, blocking: bool) -> Result<Sample, ModelError> {
    let q = robot.read_positions(blocking)?;
    let dq = robot.read_velocities(blocking)?;
    Ok(Sample { q, dq })
}

fn check_link_jacobian(
    what: &'static str,
    j: &DMatrix<f64>,
    m: usize,
) -> Result<(), DimensionError> {
    DimensionError::check(what, FOOT_CONSTRAINT_ROWS, j.nrows())?;
    DimensionError::check(what, m, j.ncols())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
