//! Online change of the active joint set and the support phase.
//!
//! [`ActiveSet`] is the single owner of the active-joint mask, the selection
//! matrix and the support phase. Applying a [`ReconfigEvent`] keeps the robot's
//! joint list, `S` and the Jacobian buffers consistent with each other; the
//! controller resizes its own per-joint vectors from the returned
//! [`ReconfigOutcome`]. Events are applied between ticks only.

use tracing::{info, warn};

use strider_core::error::{ControlError, DimensionError, ModelError};
use strider_core::traits::RobotModel;
use strider_core::types::{BASE_DOFS, SupportPhase};

use crate::jacobians::JacobianSet;
use crate::selection::SelectionMatrix;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconfigEvent {
    /// New active-joint mask over the full superset.
    ActiveJointsChanged(Vec<bool>),
    SupportPhaseChanged(SupportPhase),
}

/// Current problem size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    /// Full joint superset `D`.
    pub full_dofs: usize,
    /// Active joints `n`.
    pub joints: usize,
    /// Contact rows `k`.
    pub constraints: usize,
}

impl Dimensions {
    /// `m = n + 6`.
    pub const fn velocity_dim(&self) -> usize {
        self.joints + BASE_DOFS
    }
}

/// What a reconfiguration actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconfigOutcome {
    Unchanged,
    JointsChanged { from: usize, to: usize },
    SupportChanged { from: SupportPhase, to: SupportPhase },
}

#[derive(Debug, Clone)]
pub struct ActiveSet {
    mask: Vec<bool>,
    selection: SelectionMatrix,
    support: SupportPhase,
}

impl ActiveSet {
    pub fn new(mask: Vec<bool>, support: SupportPhase) -> Self {
        let selection = SelectionMatrix::from_mask(&mask);
        Self {
            mask,
            selection,
            support,
        }
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub const fn selection(&self) -> &SelectionMatrix {
        &self.selection
    }

    pub const fn support(&self) -> SupportPhase {
        self.support
    }

    pub fn dims(&self) -> Dimensions {
        Dimensions {
            full_dofs: self.mask.len(),
            joints: self.selection.active_count(),
            constraints: self.support.constraint_rows(),
        }
    }

    /// Add and remove robot joints until its joint list matches the mask.
    pub fn sync_robot<R: RobotModel>(&self, robot: &mut R) -> Result<(), ModelError> {
        sync_joint_list(&self.mask, robot)
    }

    /// Apply `event` to the robot, `S` and the Jacobian buffers.
    ///
    /// Re-applying the event that produced the current state is a no-op.
    pub fn apply<R: RobotModel>(
        &mut self,
        event: &ReconfigEvent,
        robot: &mut R,
        jacobians: &mut JacobianSet,
    ) -> Result<ReconfigOutcome, ControlError> {
        match event {
            ReconfigEvent::ActiveJointsChanged(mask) => self.set_mask(mask, robot, jacobians),
            ReconfigEvent::SupportPhaseChanged(phase) => Ok(self.set_support(*phase, jacobians)),
        }
    }

    fn set_mask<R: RobotModel>(
        &mut self,
        mask: &[bool],
        robot: &mut R,
        jacobians: &mut JacobianSet,
    ) -> Result<ReconfigOutcome, ControlError> {
        if mask.len() != self.mask.len() {
            return Err(ControlError::Rejected(format!(
                "active joint mask has {} entries, expected {}",
                mask.len(),
                self.mask.len()
            )));
        }
        let from = self.selection.active_count();
        let changed = mask != self.mask.as_slice();

        // The mask and S are committed only once the robot agrees with them.
        if let Err(err) = sync_joint_list(mask, robot) {
            return Err(self.roll_back(robot, err));
        }
        if changed {
            self.mask = mask.to_vec();
            self.selection = SelectionMatrix::from_mask(mask);
        }
        let n = self.selection.active_count();
        DimensionError::check("robot joint list", n, robot.joint_list().len())?;

        if jacobians.joints() != n {
            jacobians.resize_joints(n);
        }

        if changed {
            info!("strider-wbc: active joints changed ({from} -> {n})");
            Ok(ReconfigOutcome::JointsChanged { from, to: n })
        } else {
            Ok(ReconfigOutcome::Unchanged)
        }
    }

    /// Restore the robot's joint list to the committed mask after a failed
    /// sync. The original error is non-fatal only if the restore succeeds.
    fn roll_back<R: RobotModel>(&self, robot: &mut R, err: ModelError) -> ControlError {
        let restored = self.sync_robot(robot).is_ok()
            && robot.joint_list() == self.selection.active_indices();
        if restored {
            warn!("strider-wbc: joint list change failed, previous active set restored: {err}");
            ControlError::Model(err)
        } else {
            ControlError::JointSync(err)
        }
    }

    fn set_support(&mut self, phase: SupportPhase, jacobians: &mut JacobianSet) -> ReconfigOutcome {
        let k = phase.constraint_rows();
        if jacobians.constraint_rows() != k {
            jacobians.resize_constraints(k);
        }
        if phase == self.support {
            return ReconfigOutcome::Unchanged;
        }
        let from = self.support;
        self.support = phase;
        info!("strider-wbc: support phase changed ({from:?} -> {phase:?}, {k} contact rows)");
        ReconfigOutcome::SupportChanged { from, to: phase }
    }
}

fn sync_joint_list<R: RobotModel>(mask: &[bool], robot: &mut R) -> Result<(), ModelError> {
    let current = robot.joint_list();
    for (id, &wanted) in mask.iter().enumerate() {
        let present = current.binary_search(&id).is_ok();
        match (wanted, present) {
            (true, false) => robot.add_joint(id)?,
            (false, true) => robot.remove_joint(id)?,
            _ => {}
        }
    }
    // Joints outside the superset cannot be controlled
    for &id in current.iter().filter(|&&id| id >= mask.len()) {
        robot.remove_joint(id)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
