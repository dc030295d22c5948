use thiserror::Error;

/// Top-level error type for strider.
#[derive(Debug, Error)]
pub enum StriderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Initialization error: {0}")]
    Init(#[from] InitError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid period_ms: {0} (must be > 0)")]
    InvalidPeriod(u64),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Length of {field} must be {expected}, got {got}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Errors reported by the robot-model / actuation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("State read failed: {0}")]
    ReadFailed(String),

    #[error("Actuation write failed: {0}")]
    WriteFailed(String),

    #[error("Unknown joint: global index {0}")]
    UnknownJoint(usize),

    #[error("Control mode switch failed: {0}")]
    ModeSwitchFailed(String),
}

/// Errors that prevent a controller from being constructed.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Link not found in robot model: {0}")]
    MissingLink(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("First state sample unavailable: {0}")]
    StateUnavailable(ModelError),

    #[error("Active joint sync failed: {0}")]
    JointSync(ModelError),

    #[error("Dimension violation during initialization: {0}")]
    Dimension(#[from] DimensionError),

    #[error("Initial state assembly failed: {0}")]
    Assembly(ControlError),
}

impl From<ControlError> for InitError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::Model(e) => Self::StateUnavailable(e),
            ControlError::Dimension(e) => Self::Dimension(e),
            other => Self::Assembly(other),
        }
    }
}

/// Dimension contract violation between controller buffers.
///
/// Copy + static names for cheap propagation in the tick path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
pub struct DimensionError {
    pub what: &'static str,
    pub expected: usize,
    pub got: usize,
}

impl DimensionError {
    pub const fn new(what: &'static str, expected: usize, got: usize) -> Self {
        Self {
            what,
            expected,
            got,
        }
    }

    /// `Ok(())` when `got == expected`.
    pub const fn check(what: &'static str, expected: usize, got: usize) -> Result<(), Self> {
        if expected == got {
            Ok(())
        } else {
            Err(Self::new(what, expected, got))
        }
    }
}

/// Runtime errors raised by the control path.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Stale or inconsistent buffer sizes. Fatal: the control path halts.
    #[error("{0}")]
    Dimension(#[from] DimensionError),

    #[error("Singular value decomposition failed for {0}")]
    Svd(&'static str),

    #[error("Robot model error: {0}")]
    Model(#[from] ModelError),

    #[error("Rejected parameter update: {0}")]
    Rejected(String),

    /// A joint-list change failed and could not be undone. Fatal.
    #[error("Robot joint list out of sync with the active set: {0}")]
    JointSync(ModelError),
}

impl ControlError {
    /// Whether this error must halt the control path.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Dimension(_) | Self::Svd(_) | Self::JointSync(_))
    }
}
