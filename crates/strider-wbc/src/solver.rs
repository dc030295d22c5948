//! Task-priority velocity solver.
//!
//! Four tasks in strict priority, each solved in the nullspace of the ones
//! above it:
//!
//! ```text
//! N = I
//! contact:  N ← N − Jc⁺ Jc N
//! CoM:      dq += (Jcom N)⁺_damped dxc_com                  N ← N − (Jcom N)⁺ Jcom N
//! foot:     dq += (Jfoot N)⁺_damped (dxc_foot − Jfoot dq)   N ← N − (Jfoot N)⁺ Jfoot N
//! posture:  dq += (Jpost N)⁺ (dqc − Jpost dq)
//! ```
//!
//! Damping only enters the commands; the projector is always updated with the
//! undamped pseudoinverse, so `Jc · dq` stays zero whatever the damping.

use nalgebra::{DMatrix, DVector};

use strider_core::config::SolverConfig;
use strider_core::error::{ControlError, DimensionError};
use strider_core::types::{BASE_DOFS, COM_TASK_DIM, FOOT_TASK_DIM};

use crate::jacobians::JacobianSet;
use crate::pinv::{pinv_damp_trunc, pinv_trunc};

/// Feedback-corrected task velocities.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskTargets {
    /// Desired planar CoM velocity (2).
    pub com: DVector<f64>,
    /// Desired foot twist (6).
    pub foot: DVector<f64>,
    /// Desired active-joint velocity (n).
    pub posture: DVector<f64>,
}

impl TaskTargets {
    pub fn zeros(n: usize) -> Self {
        Self {
            com: DVector::zeros(COM_TASK_DIM),
            foot: DVector::zeros(FOOT_TASK_DIM),
            posture: DVector::zeros(n),
        }
    }
}

/// Result of one hierarchy solve.
#[derive(Debug, Clone)]
pub struct SolverOutput {
    /// Full desired velocity (base + joints, m).
    pub dq_des: DVector<f64>,
    /// Joint-velocity command: trailing n entries of `dq_des`.
    pub joint_command: DVector<f64>,
    pub contact_singular_values: DVector<f64>,
    pub com_singular_values: DVector<f64>,
    pub foot_singular_values: DVector<f64>,
}

/// Cascaded nullspace-projection solver.
#[derive(Debug, Clone)]
pub struct TaskHierarchySolver {
    config: SolverConfig,
}

impl TaskHierarchySolver {
    pub const fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SolverConfig::default())
    }

    pub const fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub const fn set_damping(&mut self, damping: f64) {
        self.config.pinv_damping = damping;
    }

    pub const fn set_tolerance(&mut self, tolerance: f64) {
        self.config.pinv_tolerance = tolerance;
    }

    /// Solve the hierarchy.
    ///
    /// Refuses to run when any input disagrees on `n`, `m` or a task size.
    pub fn solve(
        &self,
        jacobians: &JacobianSet,
        targets: &TaskTargets,
    ) -> Result<SolverOutput, ControlError> {
        check_dimensions(jacobians, targets)?;

        let tol = self.config.pinv_tolerance;
        let damp = self.config.pinv_damping;
        let m = jacobians.velocity_dim();
        let jc = &jacobians.contact;
        let jcom = &jacobians.com;
        let jfoot = &jacobians.foot;
        let jposture = &jacobians.posture;

        let mut dq = DVector::zeros(m);
        let mut nullspace = DMatrix::identity(m, m);

        // Contact constraints
        let (jc_pinv, contact_sv) = pinv_trunc(jc, tol, "contact Jacobian")?;
        nullspace -= &jc_pinv * jc;

        // CoM
        let jcom_n = jcom * &nullspace;
        let com = pinv_damp_trunc(&jcom_n, tol, damp, "CoM task")?;
        dq += &com.damped * &targets.com;
        nullspace -= &com.pinv * &jcom_n;

        // Swing foot
        let jfoot_n = jfoot * &nullspace;
        let foot = pinv_damp_trunc(&jfoot_n, tol, damp, "foot task")?;
        let foot_residual = &targets.foot - jfoot * &dq;
        dq += &foot.damped * foot_residual;
        nullspace -= &foot.pinv * &jfoot_n;

        // Posture
        let (jposture_pinv, _) = pinv_trunc(&(jposture * &nullspace), tol, "posture task")?;
        let posture_residual = &targets.posture - jposture * &dq;
        dq += jposture_pinv * posture_residual;

        let joint_command = dq.rows(BASE_DOFS, m - BASE_DOFS).into_owned();
        Ok(SolverOutput {
            dq_des: dq,
            joint_command,
            contact_singular_values: contact_sv,
            com_singular_values: com.singular_values,
            foot_singular_values: foot.singular_values,
        })
    }
}

fn check_dimensions(jacobians: &JacobianSet, targets: &TaskTargets) -> Result<(), DimensionError> {
    jacobians.validate()?;
    DimensionError::check("CoM target", COM_TASK_DIM, targets.com.len())?;
    DimensionError::check("foot target", FOOT_TASK_DIM, targets.foot.len())?;
    DimensionError::check("posture target", jacobians.joints(), targets.posture.len())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strider_test_utils::fixtures::{random_matrix, random_vector};

    const EPS: f64 = 1e-9;

    fn random_jacobian_set(n: usize, k: usize, seed: u64) -> JacobianSet {
        let m = n + BASE_DOFS;
        let mut set = JacobianSet::allocate(n, k);
        set.contact = random_matrix(k, m, seed);
        set.com = random_matrix(COM_TASK_DIM, m, seed + 1000);
        set.foot = random_matrix(FOOT_TASK_DIM, m, seed + 2000);
        set
    }

    fn random_targets(n: usize, seed: u64) -> TaskTargets {
        TaskTargets {
            com: random_vector(COM_TASK_DIM, seed),
            foot: random_vector(FOOT_TASK_DIM, seed + 1),
            posture: random_vector(n, seed + 2),
        }
    }

    #[test]
    fn contact_constraint_holds_single_support() {
        let solver = TaskHierarchySolver::with_defaults();
        for seed in 0..10 {
            let jac = random_jacobian_set(12, 6, seed);
            let targets = random_targets(12, seed + 100);
            let out = solver.solve(&jac, &targets).unwrap();
            assert!((&jac.contact * &out.dq_des).norm() < EPS, "seed {seed}");
        }
    }

    #[test]
    fn contact_constraint_holds_double_support() {
        let solver = TaskHierarchySolver::with_defaults();
        for seed in 0..10 {
            let jac = random_jacobian_set(25, 12, seed);
            let targets = random_targets(25, seed + 7);
            let out = solver.solve(&jac, &targets).unwrap();
            assert!((&jac.contact * &out.dq_des).norm() < EPS, "seed {seed}");
        }
    }

    #[test]
    fn contact_holds_for_huge_targets() {
        let solver = TaskHierarchySolver::with_defaults();
        let jac = random_jacobian_set(12, 6, 3);
        let mut targets = random_targets(12, 4);
        targets.com *= 1e4;
        targets.foot *= 1e4;
        targets.posture *= 1e4;
        let out = solver.solve(&jac, &targets).unwrap();
        let relative = (&jac.contact * &out.dq_des).norm() / out.dq_des.norm();
        assert!(relative < 1e-10);
    }

    #[test]
    fn posture_target_does_not_disturb_higher_tasks() {
        let solver = TaskHierarchySolver::with_defaults();
        let jac = random_jacobian_set(20, 6, 11);
        let targets_a = random_targets(20, 12);
        let mut targets_b = targets_a.clone();
        targets_b.posture = random_targets(20, 13).posture * 5.0;

        let a = solver.solve(&jac, &targets_a).unwrap();
        let b = solver.solve(&jac, &targets_b).unwrap();

        assert!(a.dq_des.metric_distance(&b.dq_des) > 1e-3, "posture must matter");
        assert_relative_eq!(&jac.contact * &a.dq_des, &jac.contact * &b.dq_des, epsilon = EPS);
        assert_relative_eq!(&jac.com * &a.dq_des, &jac.com * &b.dq_des, epsilon = EPS);
        assert_relative_eq!(&jac.foot * &a.dq_des, &jac.foot * &b.dq_des, epsilon = EPS);
    }

    #[test]
    fn undamped_com_is_tracked_exactly() {
        let solver = TaskHierarchySolver::new(SolverConfig {
            pinv_tolerance: 1e-6,
            pinv_damping: 0.0,
        });
        let jac = random_jacobian_set(15, 6, 21);
        let targets = random_targets(15, 22);
        let out = solver.solve(&jac, &targets).unwrap();
        assert_relative_eq!(&jac.com * &out.dq_des, targets.com, epsilon = 1e-8);
        assert_relative_eq!(&jac.foot * &out.dq_des, targets.foot, epsilon = 1e-8);
    }

    #[test]
    fn damping_reduces_but_keeps_direction() {
        let jac = random_jacobian_set(15, 6, 5);
        let targets = random_targets(15, 6);
        let exact = TaskHierarchySolver::new(SolverConfig {
            pinv_tolerance: 1e-6,
            pinv_damping: 0.0,
        })
        .solve(&jac, &targets)
        .unwrap();
        let damped = TaskHierarchySolver::new(SolverConfig {
            pinv_tolerance: 1e-6,
            pinv_damping: 0.5,
        })
        .solve(&jac, &targets)
        .unwrap();

        let com_exact = &jac.com * &exact.dq_des;
        let com_damped = &jac.com * &damped.dq_des;
        assert!(com_damped.norm() < com_exact.norm());
        assert!(com_damped.dot(&com_exact) > 0.0);
        // Damping never leaks into the constraint
        assert!((&jac.contact * &damped.dq_des).norm() < EPS);
    }

    #[test]
    fn joint_command_is_trailing_block() {
        let solver = TaskHierarchySolver::with_defaults();
        let jac = random_jacobian_set(8, 6, 1);
        let out = solver.solve(&jac, &random_targets(8, 2)).unwrap();
        assert_eq!(out.dq_des.len(), 14);
        assert_eq!(out.joint_command.len(), 8);
        assert_relative_eq!(out.joint_command, out.dq_des.rows(BASE_DOFS, 8).into_owned());
    }

    #[test]
    fn zero_targets_give_zero_command() {
        let solver = TaskHierarchySolver::with_defaults();
        let jac = random_jacobian_set(10, 12, 9);
        let out = solver.solve(&jac, &TaskTargets::zeros(10)).unwrap();
        assert_relative_eq!(out.dq_des.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn rank_deficient_com_is_truncated_not_amplified() {
        let solver = TaskHierarchySolver::with_defaults();
        let mut jac = random_jacobian_set(12, 6, 30);
        // Second CoM row duplicates the first: only one CoM direction exists
        let first = jac.com.row(0).into_owned();
        jac.com.set_row(1, &first);
        let mut targets = random_targets(12, 31);
        targets.com[0] = 0.1;
        targets.com[1] = -0.1;
        let out = solver.solve(&jac, &targets).unwrap();
        assert!(out.dq_des.norm().is_finite());
        assert!(out.dq_des.norm() < 1e3);
        assert!((&jac.contact * &out.dq_des).norm() < EPS);
        assert!(out.com_singular_values.iter().any(|s| *s < 1e-4));
    }

    #[test]
    fn zero_foot_jacobian_has_no_effect() {
        let solver = TaskHierarchySolver::with_defaults();
        let mut jac = random_jacobian_set(12, 12, 40);
        jac.foot.fill(0.0);
        let targets = random_targets(12, 41);
        let mut no_foot = targets.clone();
        no_foot.foot.fill(0.0);
        let a = solver.solve(&jac, &targets).unwrap();
        let b = solver.solve(&jac, &no_foot).unwrap();
        assert_relative_eq!(a.dq_des, b.dq_des, epsilon = 1e-12);
    }

    #[test]
    fn mismatched_posture_target_is_refused() {
        let solver = TaskHierarchySolver::with_defaults();
        let jac = random_jacobian_set(10, 6, 0);
        let targets = random_targets(9, 0);
        let err = solver.solve(&jac, &targets).unwrap_err();
        assert!(matches!(
            err,
            ControlError::Dimension(DimensionError {
                what: "posture target",
                expected: 10,
                got: 9
            })
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn stale_contact_stack_is_refused() {
        let solver = TaskHierarchySolver::with_defaults();
        let mut jac = random_jacobian_set(10, 6, 0);
        jac.contact = DMatrix::zeros(6, 15);
        let err = solver.solve(&jac, &random_targets(10, 0)).unwrap_err();
        assert!(matches!(err, ControlError::Dimension(_)));
    }
}
