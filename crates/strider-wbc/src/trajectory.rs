//! Minimum-jerk reference generators.
//!
//! [`MinJerkTrajGen`] smooths a (possibly moving) target: every step it plans
//! the quintic that takes the current (position, velocity, acceleration) to
//! (target, 0, 0) over the transition time and samples it one period ahead.
//! A constant target is therefore reached along a min-jerk profile with zero
//! velocity and acceleration at both ends.
//!
//! [`ReferenceTrajectories`] owns the three generators (CoM, foot, posture)
//! and advances them together once per tick.

use nalgebra::{DVector, Vector2, Vector6};

use strider_core::config::TrajectoryConfig;
use strider_core::error::DimensionError;
use strider_core::types::{COM_TASK_DIM, FOOT_TASK_DIM};

// ---------------------------------------------------------------------------
// MinJerkTrajGen
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MinJerkTrajGen {
    dt: f64,
    duration: f64,
    pos: DVector<f64>,
    vel: DVector<f64>,
    acc: DVector<f64>,
}

impl MinJerkTrajGen {
    /// Generator of dimension `dim` sampled every `dt` seconds, with
    /// transition time `duration` seconds. Starts at rest at the origin.
    pub fn new(dim: usize, dt: f64, duration: f64) -> Self {
        Self {
            dt,
            duration,
            pos: DVector::zeros(dim),
            vel: DVector::zeros(dim),
            acc: DVector::zeros(dim),
        }
    }

    pub fn dim(&self) -> usize {
        self.pos.len()
    }

    pub const fn duration(&self) -> f64 {
        self.duration
    }

    pub const fn set_duration(&mut self, duration: f64) {
        self.duration = duration;
    }

    /// Restart at rest at `x`.
    pub fn init(&mut self, x: &DVector<f64>) -> Result<(), DimensionError> {
        DimensionError::check("trajectory init", self.dim(), x.len())?;
        self.pos.copy_from(x);
        self.vel.fill(0.0);
        self.acc.fill(0.0);
        Ok(())
    }

    /// Advance one period toward `target`.
    pub fn compute_next(&mut self, target: &DVector<f64>) -> Result<(), DimensionError> {
        DimensionError::check("trajectory target", self.dim(), target.len())?;

        if self.duration <= self.dt {
            self.pos.copy_from(target);
            self.vel.fill(0.0);
            self.acc.fill(0.0);
            return Ok(());
        }

        let t = self.duration;
        let (t2, t3, t4, t5) = (t * t, t * t * t, t.powi(4), t.powi(5));
        let s = self.dt;
        let (s2, s3, s4, s5) = (s * s, s * s * s, s.powi(4), s.powi(5));

        for i in 0..self.dim() {
            let p0 = self.pos[i];
            let v0 = self.vel[i];
            let a0 = self.acc[i];
            let h = target[i] - p0;

            // Quintic with end conditions (target, 0, 0)
            let c2 = 0.5 * a0;
            let c3 = (20.0 * h - 12.0 * v0 * t - 3.0 * a0 * t2) / (2.0 * t3);
            let c4 = (-30.0 * h + 16.0 * v0 * t + 3.0 * a0 * t2) / (2.0 * t4);
            let c5 = (12.0 * h - 6.0 * v0 * t - a0 * t2) / (2.0 * t5);

            self.pos[i] = p0 + v0 * s + c2 * s2 + c3 * s3 + c4 * s4 + c5 * s5;
            self.vel[i] = v0 + 2.0 * c2 * s + 3.0 * c3 * s2 + 4.0 * c4 * s3 + 5.0 * c5 * s4;
            self.acc[i] = 2.0 * c2 + 6.0 * c3 * s + 12.0 * c4 * s2 + 20.0 * c5 * s3;
        }
        Ok(())
    }

    pub const fn position(&self) -> &DVector<f64> {
        &self.pos
    }

    pub const fn velocity(&self) -> &DVector<f64> {
        &self.vel
    }

    pub const fn acceleration(&self) -> &DVector<f64> {
        &self.acc
    }
}

// ---------------------------------------------------------------------------
// ReferenceTrajectories
// ---------------------------------------------------------------------------

/// Which generator a transition-time update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryTask {
    Com,
    Foot,
    Posture,
}

/// Reference position and velocity of every task after one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReferences {
    pub com: Vector2<f64>,
    pub com_velocity: Vector2<f64>,
    pub foot: Vector6<f64>,
    pub foot_velocity: Vector6<f64>,
    /// Full-superset posture reference (D).
    pub posture: DVector<f64>,
    pub posture_velocity: DVector<f64>,
}

/// Desired task values driving the generators.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredTargets {
    pub com: Vector2<f64>,
    pub foot: Vector6<f64>,
    /// Full-superset desired posture (D).
    pub posture: DVector<f64>,
}

impl DesiredTargets {
    pub fn zeros(full_dofs: usize) -> Self {
        Self {
            com: Vector2::zeros(),
            foot: Vector6::zeros(),
            posture: DVector::zeros(full_dofs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceTrajectories {
    com: MinJerkTrajGen,
    foot: MinJerkTrajGen,
    posture: MinJerkTrajGen,
}

impl ReferenceTrajectories {
    pub fn new(full_dofs: usize, dt: f64, times: &TrajectoryConfig) -> Self {
        Self {
            com: MinJerkTrajGen::new(COM_TASK_DIM, dt, times.com_time),
            foot: MinJerkTrajGen::new(FOOT_TASK_DIM, dt, times.foot_time),
            posture: MinJerkTrajGen::new(full_dofs, dt, times.posture_time),
        }
    }

    /// Restart all generators at rest at the measured pose.
    pub fn reseed(
        &mut self,
        com: &Vector2<f64>,
        foot: &Vector6<f64>,
        posture: &DVector<f64>,
    ) -> Result<(), DimensionError> {
        self.com.init(&DVector::from_column_slice(com.as_slice()))?;
        self.foot.init(&DVector::from_column_slice(foot.as_slice()))?;
        self.posture.init(posture)
    }

    pub const fn set_duration(&mut self, task: TrajectoryTask, duration: f64) {
        match task {
            TrajectoryTask::Com => self.com.set_duration(duration),
            TrajectoryTask::Foot => self.foot.set_duration(duration),
            TrajectoryTask::Posture => self.posture.set_duration(duration),
        }
    }

    pub const fn duration(&self, task: TrajectoryTask) -> f64 {
        match task {
            TrajectoryTask::Com => self.com.duration(),
            TrajectoryTask::Foot => self.foot.duration(),
            TrajectoryTask::Posture => self.posture.duration(),
        }
    }

    /// Advance every generator one tick toward `desired`.
    pub fn advance(&mut self, desired: &DesiredTargets) -> Result<TaskReferences, DimensionError> {
        self.com
            .compute_next(&DVector::from_column_slice(desired.com.as_slice()))?;
        self.foot
            .compute_next(&DVector::from_column_slice(desired.foot.as_slice()))?;
        self.posture.compute_next(&desired.posture)?;
        Ok(self.current())
    }

    /// Current references without advancing.
    pub fn current(&self) -> TaskReferences {
        TaskReferences {
            com: Vector2::from_column_slice(self.com.position().as_slice()),
            com_velocity: Vector2::from_column_slice(self.com.velocity().as_slice()),
            foot: Vector6::from_column_slice(self.foot.position().as_slice()),
            foot_velocity: Vector6::from_column_slice(self.foot.velocity().as_slice()),
            posture: self.posture.position().clone(),
            posture_velocity: self.posture.velocity().clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
