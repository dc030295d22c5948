use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{COM_TASK_DIM, FOOT_TASK_DIM, SupportPhase};

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_period_ms() -> u64 {
    10
}
const fn default_full_dofs() -> usize {
    25
}
fn default_right_foot() -> String {
    "r_foot".into()
}
fn default_left_foot() -> String {
    "l_foot".into()
}
fn default_com_link() -> String {
    "com".into()
}
const fn default_kp_com() -> [f64; COM_TASK_DIM] {
    [1.0, 1.0]
}
const fn default_kp_foot() -> [f64; FOOT_TASK_DIM] {
    [1.0; FOOT_TASK_DIM]
}
const fn default_traj_time() -> f64 {
    3.0
}
const fn default_pinv_tolerance() -> f64 {
    1e-4
}
const fn default_pinv_damping() -> f64 {
    0.04
}

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

/// Whole-body velocity controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Tick period in milliseconds (default: 10 = 100 Hz).
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Size `D` of the fixed full joint superset.
    #[serde(default = "default_full_dofs")]
    pub full_dofs: usize,

    /// Active-joint mask over the full superset (length `D`). Left out or
    /// empty, every joint is active.
    #[serde(default)]
    pub active_joints: Vec<bool>,

    /// Support phase at startup.
    #[serde(default)]
    pub support_phase: SupportPhase,

    #[serde(default)]
    pub links: LinkNames,

    #[serde(default)]
    pub gains: GainConfig,

    #[serde(default)]
    pub trajectory: TrajectoryConfig,

    #[serde(default)]
    pub solver: SolverConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::with_full_dofs(default_full_dofs())
    }
}

impl ControllerConfig {
    /// Default configuration for a superset of `full_dofs` joints, all active.
    pub fn with_full_dofs(full_dofs: usize) -> Self {
        let mut config = Self {
            period_ms: default_period_ms(),
            full_dofs,
            active_joints: Vec::new(),
            support_phase: SupportPhase::default(),
            links: LinkNames::default(),
            gains: GainConfig::default(),
            trajectory: TrajectoryConfig::default(),
            solver: SolverConfig::default(),
        };
        config.fill_sized_defaults();
        config
    }

    /// Size the per-joint vectors that were left empty to `full_dofs`.
    fn fill_sized_defaults(&mut self) {
        if self.active_joints.is_empty() {
            self.active_joints = vec![true; self.full_dofs];
        }
        if self.gains.kp_posture.is_empty() {
            self.gains.kp_posture = vec![1.0; self.full_dofs];
        }
    }

    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_ms == 0 {
            return Err(ConfigError::InvalidPeriod(self.period_ms));
        }
        if self.full_dofs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "full_dofs".into(),
                message: "must be > 0".into(),
            });
        }
        if self.active_joints.len() != self.full_dofs {
            return Err(ConfigError::LengthMismatch {
                field: "active_joints",
                expected: self.full_dofs,
                got: self.active_joints.len(),
            });
        }
        self.gains.validate(self.full_dofs)?;
        self.trajectory.validate()?;
        self.solver.validate()?;
        Ok(())
    }

    /// Tick period in seconds.
    pub fn period_secs(&self) -> f64 {
        self.period_ms as f64 * 1e-3
    }

    /// Tick rate in Hz.
    pub fn rate_hz(&self) -> f64 {
        1.0 / self.period_secs()
    }

    /// Parse TOML text. Per-joint vectors that are left out default to
    /// `full_dofs` entries.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(text)?;
        config.fill_sized_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// LinkNames
// ---------------------------------------------------------------------------

/// Robot-model link names resolved at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkNames {
    #[serde(default = "default_right_foot")]
    pub right_foot: String,
    #[serde(default = "default_left_foot")]
    pub left_foot: String,
    #[serde(default = "default_com_link")]
    pub com: String,
}

impl Default for LinkNames {
    fn default() -> Self {
        Self {
            right_foot: default_right_foot(),
            left_foot: default_left_foot(),
            com: default_com_link(),
        }
    }
}

// ---------------------------------------------------------------------------
// GainConfig
// ---------------------------------------------------------------------------

/// Proportional gains of the three tracking tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainConfig {
    /// CoM gains [x, y] (1/s).
    #[serde(default = "default_kp_com")]
    pub kp_com: [f64; COM_TASK_DIM],
    /// Foot gains [x, y, z, rx, ry, rz] (1/s).
    #[serde(default = "default_kp_foot")]
    pub kp_foot: [f64; FOOT_TASK_DIM],
    /// Posture gains over the full superset (length `D`, 1/s). Left out or
    /// empty, every gain is 1.
    #[serde(default)]
    pub kp_posture: Vec<f64>,
}

impl Default for GainConfig {
    fn default() -> Self {
        Self {
            kp_com: default_kp_com(),
            kp_foot: default_kp_foot(),
            kp_posture: Vec::new(),
        }
    }
}

impl GainConfig {
    fn validate(&self, full_dofs: usize) -> Result<(), ConfigError> {
        if self.kp_posture.len() != full_dofs {
            return Err(ConfigError::LengthMismatch {
                field: "kp_posture",
                expected: full_dofs,
                got: self.kp_posture.len(),
            });
        }
        let all = self
            .kp_com
            .iter()
            .chain(self.kp_foot.iter())
            .chain(self.kp_posture.iter());
        for &k in all {
            if !k.is_finite() || k < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "gains".into(),
                    message: format!("gain {k} must be finite and >= 0"),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TrajectoryConfig
// ---------------------------------------------------------------------------

/// Min-jerk transition times (seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryConfig {
    #[serde(default = "default_traj_time")]
    pub com_time: f64,
    #[serde(default = "default_traj_time")]
    pub foot_time: f64,
    #[serde(default = "default_traj_time")]
    pub posture_time: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            com_time: default_traj_time(),
            foot_time: default_traj_time(),
            posture_time: default_traj_time(),
        }
    }
}

impl TrajectoryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("trajectory.com_time", self.com_time),
            ("trajectory.foot_time", self.foot_time),
            ("trajectory.posture_time", self.posture_time),
        ] {
            validate_trajectory_time(field, value)?;
        }
        Ok(())
    }
}

/// Check a single min-jerk transition time.
pub fn validate_trajectory_time(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.into(),
            message: format!("{value} must be > 0"),
        })
    }
}

// ---------------------------------------------------------------------------
// SolverConfig
// ---------------------------------------------------------------------------

/// Pseudoinverse settings of the task-hierarchy solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Singular values below this are treated as zero.
    #[serde(default = "default_pinv_tolerance")]
    pub pinv_tolerance: f64,
    /// Damping factor applied to the CoM and foot task commands.
    #[serde(default = "default_pinv_damping")]
    pub pinv_damping: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            pinv_tolerance: default_pinv_tolerance(),
            pinv_damping: default_pinv_damping(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.pinv_tolerance.is_finite() && self.pinv_tolerance > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "solver.pinv_tolerance".into(),
                message: format!("{} must be > 0", self.pinv_tolerance),
            });
        }
        if !(self.pinv_damping.is_finite() && self.pinv_damping >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "solver.pinv_damping".into(),
                message: format!("{} must be >= 0", self.pinv_damping),
            });
        }
        Ok(())
    }
}
