//! Closed-loop behavior: controller and simulated robot stepped together.

use std::time::Duration;

use nalgebra::{DVector, Vector6};
use strider_core::config::ControllerConfig;
use strider_core::error::ControlError;
use strider_core::traits::RobotModel;
use strider_core::types::{ControlMode, ControllerStatus, StreamInput, SupportPhase};
use strider_sim::{SimConfig, SimRobot};
use strider_test_utils::{ConstantTransport, RecordingTransport, assert_annihilates};
use strider_wbc::{ControlLoop, Controller, ParamUpdate, pose_to_vector, shared};

const DT: f64 = 0.01;

fn controller(dofs: usize, support: SupportPhase) -> Controller<SimRobot> {
    let robot = SimRobot::new(SimConfig {
        full_dofs: dofs,
        seed: 8,
        ..SimConfig::default()
    });
    let mut config = ControllerConfig::with_full_dofs(dofs);
    config.support_phase = support;
    config.trajectory.com_time = 0.5;
    config.trajectory.foot_time = 0.5;
    config.gains.kp_com = [5.0, 5.0];
    config.gains.kp_foot = [5.0; 6];
    Controller::new(robot, config).unwrap()
}

fn hold_input(c: &Controller<SimRobot>) -> StreamInput {
    let t = c.telemetry();
    StreamInput {
        com: t.com,
        foot: t.foot,
        posture: c.desired().posture.as_slice().to_vec(),
    }
}

fn run(c: &mut Controller<SimRobot>, input: &StreamInput, ticks: usize) {
    for _ in 0..ticks {
        c.tick(Some(input.clone())).unwrap();
        c.robot_mut().step(DT);
    }
}

/// Pose of the right foot seen from the left foot.
fn right_in_left(c: &Controller<SimRobot>) -> Vector6<f64> {
    let robot = c.robot();
    let full = robot.full_positions();
    let q = DVector::from_iterator(
        robot.joint_list().len(),
        robot.joint_list().into_iter().map(|i| full[i]),
    );
    let right = robot.link_id("r_foot").unwrap();
    let left = robot.link_id("l_foot").unwrap();
    let rel = robot.link_transform(&q, left).inverse() * robot.link_transform(&q, right);
    pose_to_vector(&rel)
}

#[test]
fn com_converges_in_double_support_without_moving_feet() {
    let mut c = controller(25, SupportPhase::Double);
    c.start().unwrap();
    let feet_before = right_in_left(&c);

    let mut input = hold_input(&c);
    let start = c.telemetry().com;
    input.com = [start[0] + 0.01, start[1] - 0.005];
    let initial_error = 0.01_f64.hypot(0.005);

    run(&mut c, &input, 300);

    let com = c.telemetry().com;
    let error = (com[0] - input.com[0]).hypot(com[1] - input.com[1]);
    assert!(
        error < 0.2 * initial_error,
        "CoM error {error:e} vs initial {initial_error:e}"
    );
    assert!((right_in_left(&c) - feet_before).norm() < 1e-3);
}

#[test]
fn swing_foot_tracks_target_in_single_support() {
    let mut c = controller(25, SupportPhase::Left);
    c.start().unwrap();

    let mut input = hold_input(&c);
    input.foot[2] += 0.01;
    let initial_error = 0.01;

    run(&mut c, &input, 300);

    let foot = c.telemetry().foot;
    let error = (foot[2] - input.foot[2]).abs();
    assert!(error < 0.2 * initial_error, "foot z error {error:e}");
    assert_annihilates(&c.jacobians().contact, c.last_solution(), 1e-9);
}

#[test]
fn commanded_and_achieved_com_velocity_agree_when_undamped() {
    let mut c = controller(25, SupportPhase::Double);
    c.update_param(ParamUpdate::PinvDamp(0.0)).unwrap();
    c.start().unwrap();
    let mut input = hold_input(&c);
    input.com[1] += 0.02;
    run(&mut c, &input, 20);

    let t = c.telemetry();
    for i in 0..2 {
        assert!((t.com_velocity_commanded[i] - t.com_velocity_achieved[i]).abs() < 1e-8);
    }
    assert!(t.com_velocity_commanded[1].abs() > 0.0);
}

#[test]
fn read_failures_degrade_to_last_sample() {
    let mut c = controller(20, SupportPhase::Double);
    c.start().unwrap();
    let input = hold_input(&c);
    run(&mut c, &input, 3);

    c.robot_mut().set_fail_reads(true);
    let written = c.robot().commands().len();
    for _ in 0..5 {
        c.tick(Some(input.clone())).unwrap();
    }
    assert_eq!(c.degraded_reads(), 5);
    assert_eq!(c.status(), ControllerStatus::On);
    assert_eq!(c.robot().commands().len(), written + 5);

    c.robot_mut().set_fail_reads(false);
    c.tick(Some(input)).unwrap();
    assert_eq!(c.degraded_reads(), 5);
}

#[test]
fn robot_joint_drift_is_fatal_and_stops() {
    let mut c = controller(12, SupportPhase::Right);
    c.update_param(ParamUpdate::ActiveJoints(
        (0..12).map(|i| i != 4).collect(),
    ))
    .unwrap();
    c.start().unwrap();
    c.tick(None).unwrap();

    c.robot_mut().add_joint(4).unwrap();
    let err = c.tick(None).unwrap_err();
    assert!(matches!(err, ControlError::Dimension(_)));
    assert_eq!(c.status(), ControllerStatus::Off);
    assert_eq!(c.robot().mode(), ControlMode::Position);
}

#[test]
fn control_loop_thread_drives_the_simulation() {
    let c = controller(20, SupportPhase::Double);
    let mut input = hold_input(&c);
    input.com[0] += 0.005;
    let target = input.com;
    let start = c.telemetry().com;

    let shared = shared(c);
    shared.lock().start().unwrap();
    let control = ControlLoop::spawn_with(
        shared,
        ConstantTransport::new(input),
        Duration::from_millis(2),
        |c| c.robot_mut().step(DT),
    )
    .unwrap();
    std::thread::sleep(Duration::from_millis(400));
    let controller = std::sync::Arc::clone(control.controller());
    let summary = control.shutdown();

    assert!(summary.ticks > 10);
    assert_eq!(summary.errors, 0);
    let c = controller.lock();
    let com = c.telemetry().com;
    assert!((com[0] - target[0]).abs() < (start[0] - target[0]).abs());
    assert_eq!(c.robot().mode(), ControlMode::Position);
    assert_eq!(c.last_command().norm(), 0.0);
}

#[test]
fn telemetry_is_published_every_tick() {
    let c = controller(10, SupportPhase::Left);
    let transport = RecordingTransport::new();
    transport.push_input(StreamInput::zeros(3));
    let control =
        ControlLoop::spawn(shared(c), transport.clone(), Duration::from_millis(1)).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let summary = control.shutdown();

    let published = transport.published();
    assert_eq!(published.len() as u64, summary.ticks);
    assert!(published.windows(2).all(|w| w[1].tick == w[0].tick + 1));
    assert!(published.iter().all(|t| t.constraint_rows == 6));
}
