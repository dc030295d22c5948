//! Linearized floating-base biped.
//!
//! Every link has a nominal pose in the base frame and two seeded random
//! maps from the full joint vector to a position offset and a rotation
//! vector:
//!
//! ```text
//! p_L(q) = p0 + Jv · q
//! R_L(q) = exp(Jw · q) · R0
//! ```
//!
//! Jacobians are the exact derivatives of this model, so the controller sees a
//! consistent robot. Joint velocities are integrated explicitly by
//! [`SimRobot::step`] while in velocity mode.

use nalgebra::{DMatrix, DVector, Isometry3, Translation3, UnitQuaternion, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use strider_core::config::LinkNames;
use strider_core::error::ModelError;
use strider_core::so3::{skew, so3_left_jacobian};
use strider_core::traits::RobotModel;
use strider_core::types::{BASE_DOFS, ControlMode, LinkId};

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Joint superset size `D`. All joints start active.
    pub full_dofs: usize,
    /// Seed of the link maps and the measurement noise.
    pub seed: u64,
    /// Entries of `Jv` / `Jw` are uniform in `[-joint_scale, joint_scale)`.
    pub joint_scale: f64,
    /// Standard deviation of additive joint-velocity measurement noise.
    pub velocity_noise: f64,
    pub links: LinkNames,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            full_dofs: 25,
            seed: 0,
            joint_scale: 0.2,
            velocity_noise: 0.0,
            links: LinkNames::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// LinkModel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct LinkModel {
    name: String,
    nominal: Isometry3<f64>,
    jv: DMatrix<f64>,
    jw: DMatrix<f64>,
}

impl LinkModel {
    fn random(
        name: String,
        nominal: Isometry3<f64>,
        dofs: usize,
        scale: f64,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut sample = || DMatrix::from_fn(3, dofs, |_, _| rng.gen_range(-scale..scale));
        let jv = sample();
        let jw = sample();
        Self {
            name,
            nominal,
            jv,
            jw,
        }
    }

    /// Pose in the base frame at full joint vector `q`.
    fn pose(&self, q: &DVector<f64>) -> Isometry3<f64> {
        let p = self.nominal.translation.vector + &self.jv * q;
        let r = UnitQuaternion::from_scaled_axis(self.rotation_vector(q)) * self.nominal.rotation;
        Isometry3::from_parts(Translation3::from(p), r)
    }

    fn rotation_vector(&self, q: &DVector<f64>) -> Vector3<f64> {
        let w = &self.jw * q;
        Vector3::new(w[0], w[1], w[2])
    }
}

// ---------------------------------------------------------------------------
// SimRobot
// ---------------------------------------------------------------------------

/// In-process robot with command and mode logs.
#[derive(Debug, Clone)]
pub struct SimRobot {
    links: Vec<LinkModel>,
    active: Vec<usize>,
    q: DVector<f64>,
    dq: DVector<f64>,
    mode: ControlMode,
    rng: ChaCha8Rng,
    noise: Option<Normal<f64>>,
    fail_reads: bool,
    fail_writes: bool,
    joint_change_budget: Option<usize>,
    commands: Vec<DVector<f64>>,
    modes: Vec<ControlMode>,
}

impl SimRobot {
    pub fn new(config: SimConfig) -> Self {
        let dofs = config.full_dofs;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let scale = config.joint_scale.abs().max(f64::EPSILON);
        let names = config.links;
        let links = vec![
            LinkModel::random(
                names.right_foot,
                Isometry3::translation(0.0, -0.07, -0.6),
                dofs,
                scale,
                &mut rng,
            ),
            LinkModel::random(
                names.left_foot,
                Isometry3::translation(0.0, 0.07, -0.6),
                dofs,
                scale,
                &mut rng,
            ),
            LinkModel::random(
                names.com,
                Isometry3::translation(0.0, 0.0, 0.05),
                dofs,
                scale,
                &mut rng,
            ),
        ];
        let noise = (config.velocity_noise > 0.0)
            .then(|| Normal::new(0.0, config.velocity_noise).ok())
            .flatten();
        Self {
            links,
            active: (0..dofs).collect(),
            q: DVector::zeros(dofs),
            dq: DVector::zeros(dofs),
            mode: ControlMode::Position,
            rng,
            noise,
            fail_reads: false,
            fail_writes: false,
            joint_change_budget: None,
            commands: Vec::new(),
            modes: Vec::new(),
        }
    }

    pub fn full_dofs(&self) -> usize {
        self.q.len()
    }

    pub const fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Every velocity reference written so far.
    pub fn commands(&self) -> &[DVector<f64>] {
        &self.commands
    }

    /// Every control-mode switch so far.
    pub fn modes(&self) -> &[ControlMode] {
        &self.modes
    }

    /// Full-superset joint positions.
    pub const fn full_positions(&self) -> &DVector<f64> {
        &self.q
    }

    /// Make subsequent reads fail until cleared.
    pub const fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Make subsequent velocity writes fail until cleared.
    pub const fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Allow `budget` more joint additions or removals, then fail every
    /// further one. `None` lifts the limit.
    pub const fn set_joint_change_budget(&mut self, budget: Option<usize>) {
        self.joint_change_budget = budget;
    }

    fn spend_joint_change(&mut self, id: usize) -> Result<(), ModelError> {
        match &mut self.joint_change_budget {
            Some(0) => Err(ModelError::WriteFailed(format!(
                "joint list change for {id} refused"
            ))),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Overwrite the active joint positions.
    pub fn set_positions(&mut self, q: &DVector<f64>) -> Result<(), ModelError> {
        self.check_active_len(q.len())?;
        for (&i, &v) in self.active.iter().zip(q.iter()) {
            self.q[i] = v;
        }
        Ok(())
    }

    /// Overwrite the active joint velocities.
    pub fn set_velocities(&mut self, dq: &DVector<f64>) -> Result<(), ModelError> {
        self.check_active_len(dq.len())?;
        for (&i, &v) in self.active.iter().zip(dq.iter()) {
            self.dq[i] = v;
        }
        Ok(())
    }

    /// Integrate joint velocities over `dt` seconds. Joints hold still in
    /// position mode.
    pub fn step(&mut self, dt: f64) {
        if self.mode == ControlMode::Velocity {
            self.q.axpy(dt, &self.dq, 1.0);
        }
    }

    fn check_active_len(&self, got: usize) -> Result<(), ModelError> {
        if got == self.active.len() {
            Ok(())
        } else {
            Err(ModelError::WriteFailed(format!(
                "expected {} active joints, got {got}",
                self.active.len()
            )))
        }
    }

    /// Full joint vector with the active entries taken from `q`.
    fn scatter(&self, q: &DVector<f64>) -> DVector<f64> {
        let mut full = self.q.clone();
        for (&i, &v) in self.active.iter().zip(q.iter()) {
            full[i] = v;
        }
        full
    }

    fn active_subset(&self, full: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(self.active.len(), self.active.iter().map(|&i| full[i]))
    }

    fn link(&self, link: LinkId) -> Option<&LinkModel> {
        self.links.get(link.0)
    }
}

impl RobotModel for SimRobot {
    fn link_id(&self, name: &str) -> Option<LinkId> {
        self.links.iter().position(|l| l.name == name).map(LinkId)
    }

    fn read_positions(&mut self, _blocking: bool) -> Result<DVector<f64>, ModelError> {
        if self.fail_reads {
            return Err(ModelError::ReadFailed("encoder read timed out".into()));
        }
        Ok(self.active_subset(&self.q))
    }

    fn read_velocities(&mut self, _blocking: bool) -> Result<DVector<f64>, ModelError> {
        if self.fail_reads {
            return Err(ModelError::ReadFailed("encoder read timed out".into()));
        }
        let mut dq = if self.mode == ControlMode::Velocity {
            self.active_subset(&self.dq)
        } else {
            DVector::zeros(self.active.len())
        };
        if let Some(noise) = self.noise {
            for v in dq.iter_mut() {
                *v += noise.sample(&mut self.rng);
            }
        }
        Ok(dq)
    }

    fn link_transform(&self, q: &DVector<f64>, link: LinkId) -> Isometry3<f64> {
        self.link(link)
            .map_or_else(Isometry3::identity, |l| l.pose(&self.scatter(q)))
    }

    fn forward_kinematics(
        &self,
        q: &DVector<f64>,
        base: &Isometry3<f64>,
        link: LinkId,
    ) -> Isometry3<f64> {
        base * self.link_transform(q, link)
    }

    fn jacobian(&self, q: &DVector<f64>, base: &Isometry3<f64>, link: LinkId) -> DMatrix<f64> {
        let n = self.active.len();
        let mut j = DMatrix::zeros(6, BASE_DOFS + n);
        let Some(model) = self.link(link) else {
            return j;
        };
        let full = self.scatter(q);
        let rb = base.rotation.to_rotation_matrix().into_inner();
        let offset = rb * model.pose(&full).translation.vector;
        let jl = so3_left_jacobian(&model.rotation_vector(&full));

        // Base twist: linear velocity of the base origin, then angular velocity
        j.fixed_view_mut::<3, 3>(0, 0).fill_with_identity();
        j.fixed_view_mut::<3, 3>(0, 3).copy_from(&(-skew(&offset)));
        j.fixed_view_mut::<3, 3>(3, 3).fill_with_identity();

        for (col, &g) in self.active.iter().enumerate() {
            let v = rb * model.jv.fixed_view::<3, 1>(0, g);
            let w = rb * jl * model.jw.fixed_view::<3, 1>(0, g);
            j.fixed_view_mut::<3, 1>(0, BASE_DOFS + col).copy_from(&v);
            j.fixed_view_mut::<3, 1>(3, BASE_DOFS + col).copy_from(&w);
        }
        j
    }

    fn set_velocity_reference(&mut self, dq: &DVector<f64>) -> Result<(), ModelError> {
        if self.fail_writes {
            return Err(ModelError::WriteFailed("velocity port closed".into()));
        }
        self.check_active_len(dq.len())?;
        self.commands.push(dq.clone());
        for (&i, &v) in self.active.iter().zip(dq.iter()) {
            self.dq[i] = v;
        }
        Ok(())
    }

    fn set_control_mode(&mut self, mode: ControlMode) -> Result<(), ModelError> {
        debug!("strider-sim: control mode {mode:?}");
        if mode == ControlMode::Position {
            self.dq.fill(0.0);
        }
        self.mode = mode;
        self.modes.push(mode);
        Ok(())
    }

    fn joint_list(&self) -> Vec<usize> {
        self.active.clone()
    }

    fn add_joint(&mut self, id: usize) -> Result<(), ModelError> {
        if id >= self.full_dofs() {
            return Err(ModelError::UnknownJoint(id));
        }
        if let Err(pos) = self.active.binary_search(&id) {
            self.spend_joint_change(id)?;
            self.active.insert(pos, id);
            debug!("strider-sim: joint {id} added");
        }
        Ok(())
    }

    fn remove_joint(&mut self, id: usize) -> Result<(), ModelError> {
        if id >= self.full_dofs() {
            return Err(ModelError::UnknownJoint(id));
        }
        if let Ok(pos) = self.active.binary_search(&id) {
            self.spend_joint_change(id)?;
            self.active.remove(pos);
            self.dq[id] = 0.0;
            debug!("strider-sim: joint {id} removed");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn robot(dofs: usize) -> SimRobot {
        SimRobot::new(SimConfig {
            full_dofs: dofs,
            seed: 11,
            ..SimConfig::default()
        })
    }

    #[test]
    fn default_links_resolve() {
        let r = robot(6);
        assert_eq!(r.link_id("r_foot"), Some(LinkId(0)));
        assert_eq!(r.link_id("l_foot"), Some(LinkId(1)));
        assert_eq!(r.link_id("com"), Some(LinkId(2)));
        assert_eq!(r.link_id("head"), None);
    }

    #[test]
    fn same_seed_same_robot() {
        let a = robot(8);
        let b = robot(8);
        let q = DVector::from_element(8, 0.1);
        let base = Isometry3::identity();
        assert_eq!(a.jacobian(&q, &base, LinkId(2)), b.jacobian(&q, &base, LinkId(2)));
    }

    #[test]
    fn jacobian_matches_finite_difference() {
        let r = robot(7);
        let base = Isometry3::from_parts(
            Translation3::new(0.1, 0.2, 0.3),
            UnitQuaternion::from_scaled_axis(Vector3::new(0.2, -0.1, 0.4)),
        );
        let q = DVector::from_fn(7, |i, _| 0.1 * i as f64 - 0.3);
        let j = r.jacobian(&q, &base, LinkId(0));
        let h = 1e-6;

        for c in 0..7 {
            let mut qh = q.clone();
            qh[c] += h;
            let p0 = r.forward_kinematics(&q, &base, LinkId(0));
            let p1 = r.forward_kinematics(&qh, &base, LinkId(0));
            let v = (p1.translation.vector - p0.translation.vector) / h;
            let w = (p1.rotation * p0.rotation.inverse()).scaled_axis() / h;
            let col = BASE_DOFS + c;
            assert_relative_eq!(j.fixed_view::<3, 1>(0, col).into_owned(), v, epsilon = 1e-4);
            assert_relative_eq!(j.fixed_view::<3, 1>(3, col).into_owned(), w, epsilon = 1e-4);
        }
    }

    #[test]
    fn removing_joints_shrinks_jacobian() {
        let mut r = robot(6);
        r.remove_joint(2).unwrap();
        r.remove_joint(2).unwrap();
        assert_eq!(r.joint_list(), vec![0, 1, 3, 4, 5]);
        let q = r.read_positions(true).unwrap();
        assert_eq!(q.len(), 5);
        assert_eq!(r.jacobian(&q, &Isometry3::identity(), LinkId(1)).ncols(), 11);

        r.add_joint(2).unwrap();
        assert_eq!(r.joint_list(), vec![0, 1, 2, 3, 4, 5]);
        assert!(matches!(r.add_joint(6), Err(ModelError::UnknownJoint(6))));
    }

    #[test]
    fn step_integrates_only_in_velocity_mode() {
        let mut r = robot(3);
        let dq = DVector::from_vec(vec![1.0, -1.0, 0.5]);
        r.set_velocity_reference(&dq).unwrap();
        r.step(0.1);
        assert_eq!(r.full_positions().norm(), 0.0);

        r.set_control_mode(ControlMode::Velocity).unwrap();
        r.set_velocity_reference(&dq).unwrap();
        r.step(0.1);
        assert_relative_eq!(r.full_positions(), &(dq * 0.1), epsilon = 1e-12);
        assert_eq!(r.commands().len(), 2);
        assert_eq!(r.modes(), &[ControlMode::Velocity]);
    }

    #[test]
    fn failing_reads_and_writes() {
        let mut r = robot(3);
        r.set_fail_reads(true);
        assert!(matches!(r.read_positions(false), Err(ModelError::ReadFailed(_))));
        r.set_fail_writes(true);
        assert!(r.set_velocity_reference(&DVector::zeros(3)).is_err());
        assert!(r.commands().is_empty());
    }

    #[test]
    fn joint_change_budget_runs_out() {
        let mut r = robot(4);
        r.set_joint_change_budget(Some(1));
        r.remove_joint(0).unwrap();
        assert!(matches!(r.remove_joint(1), Err(ModelError::WriteFailed(_))));
        // No-op changes do not spend the budget
        r.add_joint(2).unwrap();
        assert_eq!(r.joint_list(), vec![1, 2, 3]);

        r.set_joint_change_budget(None);
        r.add_joint(0).unwrap();
        assert_eq!(r.joint_list(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn wrong_command_length_rejected() {
        let mut r = robot(4);
        assert!(matches!(
            r.set_velocity_reference(&DVector::zeros(3)),
            Err(ModelError::WriteFailed(_))
        ));
    }

    #[test]
    fn velocity_noise_is_seeded() {
        let config = SimConfig {
            full_dofs: 4,
            velocity_noise: 0.01,
            ..SimConfig::default()
        };
        let mut a = SimRobot::new(config.clone());
        let mut b = SimRobot::new(config);
        let va = a.read_velocities(false).unwrap();
        assert_eq!(va, b.read_velocities(false).unwrap());
        assert!(va.norm() > 0.0);
    }
}
