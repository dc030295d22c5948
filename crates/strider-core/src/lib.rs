// strider-core: Types, traits, config and errors for the Strider whole-body controller.

pub mod config;
pub mod error;
pub mod so3;
pub mod traits;
pub mod types;

pub mod prelude {
    pub use crate::config::{
        ControllerConfig, GainConfig, LinkNames, SolverConfig, TrajectoryConfig,
    };
    pub use crate::error::{
        ConfigError, ControlError, DimensionError, InitError, ModelError, StriderError,
    };
    pub use crate::traits::{NullTransport, RobotModel, StreamTransport};
    pub use crate::types::{
        BASE_DOFS, COM_TASK_DIM, ControlMode, ControllerStatus, FOOT_TASK_DIM, Foot, LinkId,
        StreamInput, SupportPhase, Telemetry,
    };
}
