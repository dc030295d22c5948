//! Runtime parameters, commands and the events they raise.

use serde::{Deserialize, Serialize};

use strider_core::config::{ControllerConfig, validate_trajectory_time};
use strider_core::error::ControlError;
use strider_core::types::{COM_TASK_DIM, FOOT_TASK_DIM, SupportPhase};

/// Identifier of a runtime-tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamId {
    ActiveJoints,
    SupportPhase,
    TrajTimeCom,
    TrajTimeFoot,
    TrajTimePosture,
    KpCom,
    KpFoot,
    KpPosture,
    PinvDamp,
    PinvTol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandId {
    Start,
    Stop,
}

/// Single entry point for everything that reaches the controller from the
/// communication side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    ParameterChanged(ParamId),
    CommandReceived(CommandId),
}

/// A parameter together with its new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "param", content = "value", rename_all = "snake_case")]
pub enum ParamUpdate {
    ActiveJoints(Vec<bool>),
    SupportPhase(SupportPhase),
    TrajTimeCom(f64),
    TrajTimeFoot(f64),
    TrajTimePosture(f64),
    KpCom([f64; COM_TASK_DIM]),
    KpFoot([f64; FOOT_TASK_DIM]),
    KpPosture(Vec<f64>),
    PinvDamp(f64),
    PinvTol(f64),
}

impl ParamUpdate {
    pub const fn id(&self) -> ParamId {
        match self {
            Self::ActiveJoints(_) => ParamId::ActiveJoints,
            Self::SupportPhase(_) => ParamId::SupportPhase,
            Self::TrajTimeCom(_) => ParamId::TrajTimeCom,
            Self::TrajTimeFoot(_) => ParamId::TrajTimeFoot,
            Self::TrajTimePosture(_) => ParamId::TrajTimePosture,
            Self::KpCom(_) => ParamId::KpCom,
            Self::KpFoot(_) => ParamId::KpFoot,
            Self::KpPosture(_) => ParamId::KpPosture,
            Self::PinvDamp(_) => ParamId::PinvDamp,
            Self::PinvTol(_) => ParamId::PinvTol,
        }
    }

    /// Store the value into `config`.
    ///
    /// The value is checked against the same rules as file configuration; an
    /// invalid value leaves `config` untouched.
    pub fn apply(&self, config: &mut ControllerConfig) -> Result<(), ControlError> {
        let mut next = config.clone();
        match self {
            Self::ActiveJoints(mask) => next.active_joints.clone_from(mask),
            Self::SupportPhase(phase) => next.support_phase = *phase,
            Self::TrajTimeCom(t) => {
                validate_trajectory_time("trajectory.com_time", *t).map_err(rejected)?;
                next.trajectory.com_time = *t;
            }
            Self::TrajTimeFoot(t) => {
                validate_trajectory_time("trajectory.foot_time", *t).map_err(rejected)?;
                next.trajectory.foot_time = *t;
            }
            Self::TrajTimePosture(t) => {
                validate_trajectory_time("trajectory.posture_time", *t).map_err(rejected)?;
                next.trajectory.posture_time = *t;
            }
            Self::KpCom(kp) => next.gains.kp_com = *kp,
            Self::KpFoot(kp) => next.gains.kp_foot = *kp,
            Self::KpPosture(kp) => next.gains.kp_posture.clone_from(kp),
            Self::PinvDamp(d) => next.solver.pinv_damping = *d,
            Self::PinvTol(t) => next.solver.pinv_tolerance = *t,
        }
        next.validate().map_err(rejected)?;
        *config = next;
        Ok(())
    }
}

fn rejected(err: impl std::fmt::Display) -> ControlError {
    ControlError::Rejected(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_match_variants() {
        assert_eq!(ParamUpdate::PinvDamp(0.1).id(), ParamId::PinvDamp);
        assert_eq!(
            ParamUpdate::SupportPhase(SupportPhase::Left).id(),
            ParamId::SupportPhase
        );
        assert_eq!(ParamUpdate::KpPosture(vec![]).id(), ParamId::KpPosture);
    }

    #[test]
    fn valid_update_is_stored() {
        let mut config = ControllerConfig::default();
        ParamUpdate::TrajTimeFoot(1.5).apply(&mut config).unwrap();
        ParamUpdate::KpCom([2.0, 3.0]).apply(&mut config).unwrap();
        assert!((config.trajectory.foot_time - 1.5).abs() < 1e-12);
        assert_eq!(config.gains.kp_com, [2.0, 3.0]);
    }

    #[test]
    fn invalid_update_leaves_config_untouched() {
        let mut config = ControllerConfig::default();
        let before = config.clone();
        for update in [
            ParamUpdate::TrajTimeCom(0.0),
            ParamUpdate::PinvTol(-1.0),
            ParamUpdate::PinvDamp(f64::NAN),
            ParamUpdate::KpPosture(vec![1.0; 3]),
            ParamUpdate::ActiveJoints(vec![true; 2]),
            ParamUpdate::KpFoot([1.0, 1.0, 1.0, -1.0, 1.0, 1.0]),
        ] {
            let err = update.apply(&mut config).unwrap_err();
            assert!(matches!(err, ControlError::Rejected(_)), "{update:?}");
        }
        assert_eq!(config, before);
    }

    #[test]
    fn update_serde_shape() {
        let json = serde_json::to_string(&ParamUpdate::TrajTimePosture(2.0)).unwrap();
        assert_eq!(json, r#"{"param":"traj_time_posture","value":2.0}"#);
        let back: ParamUpdate =
            serde_json::from_str(r#"{"param":"support_phase","value":"right"}"#).unwrap();
        assert_eq!(back, ParamUpdate::SupportPhase(SupportPhase::Right));
    }

    #[test]
    fn event_serde() {
        let json = serde_json::to_string(&Event::CommandReceived(CommandId::Start)).unwrap();
        assert_eq!(json, r#"{"command_received":"start"}"#);
    }
}
