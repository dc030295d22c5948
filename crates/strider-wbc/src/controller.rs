//! The whole-body velocity controller.
//!
//! [`Controller`] owns the robot interface, every buffer sized by `n`/`k`, the
//! three reference generators and the hierarchy solver. It is driven from a
//! single periodic thread through [`Controller::tick`]; parameter updates,
//! commands and reconfiguration go through the same object between ticks.
//!
//! Each tick while on:
//!
//! ```text
//! dxc_com  = dxr_com  + kp_com  ∘ (xr_com − x_com)
//! dxc_foot = dxr_foot + kp_foot ∘ pose_error(x_foot, xr_foot)
//! dqc      = S·dqr    + (S·kp_posture) ∘ (S·qr − q)
//! ```
//!
//! followed by the hierarchy solve and a velocity-reference write.

use nalgebra::{DVector, Vector2, Vector6};
use tracing::{debug, error, info, warn};

use strider_core::config::ControllerConfig;
use strider_core::error::{ControlError, DimensionError, InitError, ModelError};
use strider_core::traits::RobotModel;
use strider_core::types::{
    COM_TASK_DIM, ControlMode, ControllerStatus, StreamInput, SupportPhase, Telemetry,
};

use crate::assembler::{LinkIds, RobotState, StateAssembler};
use crate::jacobians::JacobianSet;
use crate::params::{CommandId, Event, ParamId, ParamUpdate};
use crate::pose::{pose_error, pose_rate_to_twist, vector_to_pose};
use crate::reconfig::{ActiveSet, Dimensions, ReconfigEvent, ReconfigOutcome};
use crate::selection::SelectionMatrix;
use crate::solver::{SolverOutput, TaskHierarchySolver, TaskTargets};
use crate::trajectory::{DesiredTargets, ReferenceTrajectories, TaskReferences, TrajectoryTask};

/// Generators to restart at the measured state on the next tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PendingReseed {
    com_and_foot: bool,
    posture: bool,
}

pub struct Controller<R: RobotModel> {
    robot: R,
    config: ControllerConfig,
    active: ActiveSet,
    jacobians: JacobianSet,
    assembler: StateAssembler,
    solver: TaskHierarchySolver,
    references: ReferenceTrajectories,
    desired: DesiredTargets,
    kp_posture: DVector<f64>,
    status: ControllerStatus,
    command: DVector<f64>,
    dq_des: DVector<f64>,
    telemetry: Telemetry,
    ticks: u64,
    pending: PendingReseed,
}

impl<R: RobotModel> Controller<R> {
    /// Validate `config`, resolve links, align the robot's joint list with
    /// the active mask and take a blocking first sample. Starts off.
    pub fn new(mut robot: R, config: ControllerConfig) -> Result<Self, InitError> {
        config.validate()?;
        let links = LinkIds::resolve(&robot, &config.links)?;

        let active = ActiveSet::new(config.active_joints.clone(), config.support_phase);
        active.sync_robot(&mut robot).map_err(InitError::JointSync)?;
        let dims = active.dims();
        DimensionError::check("robot joint list", dims.joints, robot.joint_list().len())?;

        let mut jacobians = JacobianSet::allocate(dims.joints, dims.constraints);
        let mut assembler = StateAssembler::new(links);
        let solver = TaskHierarchySolver::new(config.solver);
        let state = assembler
            .assemble(
                &mut robot,
                active.support(),
                &mut jacobians,
                config.solver.pinv_tolerance,
                true,
            )?
            .ok_or_else(|| InitError::StateUnavailable(no_sample()))?;

        let kp_posture = active
            .selection()
            .project(&DVector::from_column_slice(&config.gains.kp_posture))?;
        let references =
            ReferenceTrajectories::new(dims.full_dofs, config.period_secs(), &config.trajectory);

        let mut controller = Self {
            robot,
            active,
            jacobians,
            assembler,
            solver,
            references,
            desired: DesiredTargets::zeros(dims.full_dofs),
            kp_posture,
            status: ControllerStatus::Off,
            command: DVector::zeros(dims.joints),
            dq_des: DVector::zeros(dims.velocity_dim()),
            telemetry: Telemetry::default(),
            ticks: 0,
            pending: PendingReseed::default(),
            config,
        };
        controller.reseed(&state, true, true)?;
        let refs = controller.references.current();
        controller.record(&state, &refs, None);

        info!(
            "strider-wbc: controller ready ({} of {} joints active, {} contact rows, {} Hz)",
            dims.joints,
            dims.full_dofs,
            dims.constraints,
            controller.config.rate_hz()
        );
        Ok(controller)
    }

    // ---- Accessors ----

    pub const fn status(&self) -> ControllerStatus {
        self.status
    }

    pub fn dims(&self) -> Dimensions {
        self.active.dims()
    }

    pub const fn support_phase(&self) -> SupportPhase {
        self.active.support()
    }

    pub const fn selection(&self) -> &SelectionMatrix {
        self.active.selection()
    }

    pub const fn jacobians(&self) -> &JacobianSet {
        &self.jacobians
    }

    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub const fn robot(&self) -> &R {
        &self.robot
    }

    pub const fn robot_mut(&mut self) -> &mut R {
        &mut self.robot
    }

    pub const fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub const fn desired(&self) -> &DesiredTargets {
        &self.desired
    }

    /// Last joint-velocity command written (n).
    pub const fn last_command(&self) -> &DVector<f64> {
        &self.command
    }

    /// Full desired velocity (base + joints) of the last solve.
    pub const fn last_solution(&self) -> &DVector<f64> {
        &self.dq_des
    }

    /// Posture gains projected onto the active joints (n).
    pub const fn active_posture_gains(&self) -> &DVector<f64> {
        &self.kp_posture
    }

    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks that ran on a reused sample or skipped control.
    pub const fn degraded_reads(&self) -> u64 {
        self.assembler.degraded_reads()
    }

    // ---- Tick ----

    /// One control period.
    ///
    /// Fatal errors (dimension violations, SVD failure) stop the controller
    /// before being returned.
    pub fn tick(&mut self, input: Option<StreamInput>) -> Result<(), ControlError> {
        self.ticks += 1;
        if let Some(input) = input {
            self.apply_input(&input);
        }
        match self.run_tick() {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn run_tick(&mut self) -> Result<(), ControlError> {
        let Some(state) = self.assembler.assemble(
            &mut self.robot,
            self.active.support(),
            &mut self.jacobians,
            self.solver.config().pinv_tolerance,
            false,
        )?
        else {
            self.telemetry.tick = self.ticks;
            return Ok(());
        };

        if self.status == ControllerStatus::Off {
            let refs = self.references.current();
            self.record(&state, &refs, None);
            return Ok(());
        }

        if self.pending != PendingReseed::default() {
            let pending = std::mem::take(&mut self.pending);
            self.reseed(&state, pending.com_and_foot, pending.posture)?;
        }

        let refs = self.references.advance(&self.desired)?;
        let targets = self.feedback(&state, &refs)?;
        let out = self.solver.solve(&self.jacobians, &targets)?;
        self.dq_des.clone_from(&out.dq_des);

        match self.robot.set_velocity_reference(&out.joint_command) {
            Ok(()) => self.command.copy_from(&out.joint_command),
            Err(err) => warn!("strider-wbc: velocity reference not written: {err}"),
        }

        self.record(&state, &refs, Some((&targets, &out)));
        debug!(
            "strider-wbc: tick {} residual {:.3e} |dq| {:.3e}",
            self.ticks,
            self.telemetry.contact_residual,
            out.joint_command.norm()
        );
        Ok(())
    }

    /// Feedback-corrected task velocities.
    fn feedback(
        &self,
        state: &RobotState,
        refs: &TaskReferences,
    ) -> Result<TaskTargets, ControlError> {
        let gains = &self.config.gains;
        let s = self.active.selection();

        let kp_com = Vector2::from(gains.kp_com);
        let com = refs.com_velocity + kp_com.component_mul(&(refs.com - state.com));

        let kp_foot = Vector6::from(gains.kp_foot);
        let foot_err = pose_error(&state.foot, &vector_to_pose(&refs.foot));
        let foot_ff = pose_rate_to_twist(&refs.foot, &refs.foot_velocity);
        let foot = foot_ff + kp_foot.component_mul(&foot_err);

        let qr = s.project(&refs.posture)?;
        let dqr = s.project(&refs.posture_velocity)?;
        let posture = dqr + self.kp_posture.component_mul(&(qr - &state.q));

        Ok(TaskTargets {
            com: DVector::from_column_slice(com.as_slice()),
            foot: DVector::from_column_slice(foot.as_slice()),
            posture,
        })
    }

    fn apply_input(&mut self, input: &StreamInput) {
        let finite = input
            .com
            .iter()
            .chain(&input.foot)
            .chain(&input.posture)
            .all(|v| v.is_finite());
        if !finite {
            warn!("strider-wbc: streamed input contains non-finite values, ignored");
            return;
        }
        self.desired.com = Vector2::from(input.com);
        self.desired.foot = Vector6::from(input.foot);
        if input.posture.len() == self.desired.posture.len() {
            self.desired.posture.copy_from_slice(&input.posture);
        } else {
            warn!(
                "strider-wbc: streamed posture has {} entries, expected {}; keeping previous",
                input.posture.len(),
                self.desired.posture.len()
            );
        }
    }

    /// Restart the selected generators at rest at the measured state and
    /// make them the desired values.
    fn reseed(
        &mut self,
        state: &RobotState,
        com_and_foot: bool,
        posture: bool,
    ) -> Result<(), ControlError> {
        let current = self.references.current();
        let com = if com_and_foot { state.com } else { current.com };
        let foot = if com_and_foot {
            state.foot_vector()
        } else {
            current.foot
        };
        let mut full = current.posture;
        if posture {
            self.active.selection().merge_into(&state.q, &mut full)?;
        }
        self.references.reseed(&com, &foot, &full)?;
        if com_and_foot {
            self.desired.com = com;
            self.desired.foot = foot;
        }
        if posture {
            self.active
                .selection()
                .merge_into(&state.q, &mut self.desired.posture)?;
        }
        Ok(())
    }

    fn record(
        &mut self,
        state: &RobotState,
        refs: &TaskReferences,
        solve: Option<(&TaskTargets, &SolverOutput)>,
    ) {
        let dims = self.active.dims();
        let t = &mut self.telemetry;
        t.tick = self.ticks;
        t.status = self.status;
        t.support_phase = self.active.support();
        t.active_joints = dims.joints;
        t.constraint_rows = dims.constraints;
        t.com = [state.com.x, state.com.y];
        t.com_reference = [refs.com.x, refs.com.y];
        t.foot = to_array(state.foot_vector().as_slice());
        t.foot_reference = to_array(refs.foot.as_slice());
        t.joint_positions = state.q.as_slice().to_vec();
        t.posture_reference = refs.posture.as_slice().to_vec();
        t.joint_velocity_command = self.command.as_slice().to_vec();
        t.right_foot_speed = (&self.jacobians.right_foot * &state.dq).norm();
        t.left_foot_speed = (&self.jacobians.left_foot * &state.dq).norm();
        match solve {
            Some((targets, out)) => {
                let achieved = &self.jacobians.com * &out.dq_des;
                t.com_velocity_commanded = to_array(targets.com.as_slice());
                t.com_velocity_achieved = to_array(achieved.as_slice());
                t.contact_residual = (&self.jacobians.contact * &out.dq_des).norm();
            }
            None => {
                t.com_velocity_commanded = [0.0; COM_TASK_DIM];
                t.com_velocity_achieved = [0.0; COM_TASK_DIM];
                t.contact_residual = 0.0;
            }
        }
    }

    fn fail(&mut self, err: ControlError) -> ControlError {
        if err.is_fatal() {
            error!("strider-wbc: {err}; stopping controller");
            self.stop();
        }
        err
    }

    // ---- Lifecycle ----

    /// Off → On: blocking read, reseed every generator at the measured state,
    /// switch actuation to velocity mode.
    pub fn start(&mut self) -> Result<(), ControlError> {
        if self.status == ControllerStatus::On {
            debug!("strider-wbc: start ignored, already on");
            return Ok(());
        }
        let state = match self.assembler.assemble(
            &mut self.robot,
            self.active.support(),
            &mut self.jacobians,
            self.solver.config().pinv_tolerance,
            true,
        ) {
            Ok(Some(state)) => state,
            Ok(None) => return Err(no_sample().into()),
            Err(err) => return Err(self.fail(err)),
        };
        if let Err(err) = self.reseed(&state, true, true) {
            return Err(self.fail(err));
        }
        self.pending = PendingReseed::default();
        self.robot.set_control_mode(ControlMode::Velocity)?;
        self.status = ControllerStatus::On;
        let refs = self.references.current();
        self.record(&state, &refs, None);
        info!("strider-wbc: controller started");
        Ok(())
    }

    /// Any → Off: write a zero velocity reference and switch actuation back
    /// to position mode. Failures are logged, never returned.
    pub fn stop(&mut self) {
        let zero = DVector::zeros(self.active.dims().joints);
        if let Err(err) = self.robot.set_velocity_reference(&zero) {
            warn!("strider-wbc: zero velocity reference not written: {err}");
        }
        if let Err(err) = self.robot.set_control_mode(ControlMode::Position) {
            warn!("strider-wbc: position mode switch failed: {err}");
        }
        self.command = zero;
        self.dq_des.fill(0.0);
        self.status = ControllerStatus::Off;
        self.telemetry.status = self.status;
        self.telemetry.joint_velocity_command = self.command.as_slice().to_vec();
        info!("strider-wbc: controller stopped");
    }

    // ---- Events ----

    /// Single entry point for parameter-change notifications and commands.
    pub fn dispatch(&mut self, event: Event) -> Result<(), ControlError> {
        match event {
            Event::CommandReceived(CommandId::Start) => self.start(),
            Event::CommandReceived(CommandId::Stop) => {
                self.stop();
                Ok(())
            }
            Event::ParameterChanged(id) => self.parameter_changed(id),
        }
    }

    /// Store a new parameter value and raise its change event.
    pub fn update_param(&mut self, update: ParamUpdate) -> Result<(), ControlError> {
        if let Err(err) = update.apply(&mut self.config) {
            warn!("strider-wbc: {:?} update refused: {err}", update.id());
            return Err(err);
        }
        self.dispatch(Event::ParameterChanged(update.id()))
    }

    fn parameter_changed(&mut self, id: ParamId) -> Result<(), ControlError> {
        match id {
            ParamId::ActiveJoints => {
                let mask = self.config.active_joints.clone();
                self.reconfigure(ReconfigEvent::ActiveJointsChanged(mask))?;
            }
            ParamId::SupportPhase => {
                let phase = self.config.support_phase;
                self.reconfigure(ReconfigEvent::SupportPhaseChanged(phase))?;
            }
            ParamId::TrajTimeCom => self
                .references
                .set_duration(TrajectoryTask::Com, self.config.trajectory.com_time),
            ParamId::TrajTimeFoot => self
                .references
                .set_duration(TrajectoryTask::Foot, self.config.trajectory.foot_time),
            ParamId::TrajTimePosture => self
                .references
                .set_duration(TrajectoryTask::Posture, self.config.trajectory.posture_time),
            ParamId::KpCom | ParamId::KpFoot => {}
            ParamId::KpPosture => self.project_posture_gains()?,
            ParamId::PinvDamp => self.solver.set_damping(self.config.solver.pinv_damping),
            ParamId::PinvTol => self.solver.set_tolerance(self.config.solver.pinv_tolerance),
        }
        debug!("strider-wbc: parameter {id:?} applied");
        Ok(())
    }

    fn project_posture_gains(&mut self) -> Result<(), ControlError> {
        let full = DVector::from_column_slice(&self.config.gains.kp_posture);
        self.kp_posture = self.active.selection().project(&full)?;
        Ok(())
    }

    /// Apply a structural change between ticks.
    ///
    /// Re-applying the event that produced the current layout changes
    /// nothing.
    pub fn reconfigure(&mut self, event: ReconfigEvent) -> Result<ReconfigOutcome, ControlError> {
        let outcome = match self
            .active
            .apply(&event, &mut self.robot, &mut self.jacobians)
        {
            Ok(outcome) => outcome,
            Err(err) => {
                // Config mirrors the layout that is actually in effect
                self.config.active_joints = self.active.mask().to_vec();
                self.config.support_phase = self.active.support();
                if !err.is_fatal() {
                    warn!("strider-wbc: reconfiguration refused: {err}");
                }
                return Err(self.fail(err));
            }
        };
        self.config.active_joints = self.active.mask().to_vec();
        self.config.support_phase = self.active.support();

        match outcome {
            ReconfigOutcome::Unchanged => {}
            ReconfigOutcome::JointsChanged { to, .. } => {
                self.command = DVector::zeros(to);
                self.dq_des = DVector::zeros(self.active.dims().velocity_dim());
                self.assembler.invalidate();
                if let Err(err) = self.project_posture_gains() {
                    return Err(self.fail(err));
                }
                if self.status == ControllerStatus::On {
                    self.pending.posture = true;
                    // Newly added joints must also track velocity
                    if let Err(err) = self.robot.set_control_mode(ControlMode::Velocity) {
                        warn!("strider-wbc: velocity mode switch failed: {err}");
                    }
                }
            }
            ReconfigOutcome::SupportChanged { .. } => {
                if self.status == ControllerStatus::On {
                    self.pending.com_and_foot = true;
                }
            }
        }
        Ok(outcome)
    }
}

fn no_sample() -> ModelError {
    ModelError::ReadFailed("no state sample".into())
}

fn to_array<const N: usize>(v: &[f64]) -> [f64; N] {
    std::array::from_fn(|i| v.get(i).copied().unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
