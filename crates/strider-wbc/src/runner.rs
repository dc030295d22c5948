//! Periodic control thread.
//!
//! The controller is shared as `Arc<Mutex<Controller>>`: the loop holds the
//! lock for a whole tick (input read, state read, solve, command write,
//! telemetry publish), so parameter updates and commands issued from other
//! threads always land between ticks.
//!
//! Overrun policy: a tick that ends after its deadline is logged and counted,
//! and the next tick starts immediately. Missed ticks are never replayed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use strider_core::traits::{RobotModel, StreamTransport};

use crate::controller::Controller;

pub type SharedController<R> = Arc<Mutex<Controller<R>>>;

pub fn shared<R: RobotModel>(controller: Controller<R>) -> SharedController<R> {
    Arc::new(Mutex::new(controller))
}

// ---------------------------------------------------------------------------
// LoopStats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct LoopStats {
    ticks: AtomicU64,
    overruns: AtomicU64,
    errors: AtomicU64,
}

impl LoopStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> LoopSummary {
        LoopSummary {
            ticks: self.ticks(),
            overruns: self.overruns(),
            errors: self.errors(),
        }
    }
}

/// Counters at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopSummary {
    pub ticks: u64,
    pub overruns: u64,
    pub errors: u64,
}

// ---------------------------------------------------------------------------
// ControlLoop
// ---------------------------------------------------------------------------

pub struct ControlLoop<R: RobotModel> {
    controller: SharedController<R>,
    running: Arc<AtomicBool>,
    stats: Arc<LoopStats>,
    handle: Option<JoinHandle<()>>,
}

impl<R: RobotModel> ControlLoop<R> {
    /// Start ticking `controller` every `period`.
    pub fn spawn<T: StreamTransport>(
        controller: SharedController<R>,
        transport: T,
        period: Duration,
    ) -> std::io::Result<Self> {
        Self::spawn_with(controller, transport, period, |_| {})
    }

    /// Like [`spawn`](Self::spawn), running `after_tick` under the lock once
    /// per tick after telemetry is published.
    pub fn spawn_with<T, F>(
        controller: SharedController<R>,
        mut transport: T,
        period: Duration,
        mut after_tick: F,
    ) -> std::io::Result<Self>
    where
        T: StreamTransport,
        F: FnMut(&mut Controller<R>) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(LoopStats::default());

        let shared = Arc::clone(&controller);
        let flag = Arc::clone(&running);
        let counters = Arc::clone(&stats);
        let handle = thread::Builder::new()
            .name("strider-control".into())
            .spawn(move || {
                let mut deadline = Instant::now() + period;
                while flag.load(Ordering::Acquire) {
                    {
                        let mut c = shared.lock();
                        let input = transport.read_inputs();
                        if c.tick(input).is_err() {
                            counters.errors.fetch_add(1, Ordering::Relaxed);
                        }
                        transport.publish(c.telemetry());
                        after_tick(&mut c);
                    }
                    counters.ticks.fetch_add(1, Ordering::Relaxed);

                    let now = Instant::now();
                    if now > deadline {
                        counters.overruns.fetch_add(1, Ordering::Relaxed);
                        warn!("strider-wbc: tick overran its period by {:?}", now - deadline);
                        deadline = now + period;
                    } else {
                        thread::sleep(deadline - now);
                        deadline += period;
                    }
                }
            })?;

        info!("strider-wbc: control loop started ({period:?} period)");
        Ok(Self {
            controller,
            running,
            stats,
            handle: Some(handle),
        })
    }

    pub const fn controller(&self) -> &SharedController<R> {
        &self.controller
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Stop the thread, then stop the controller (zero command, position
    /// mode).
    pub fn shutdown(mut self) -> LoopSummary {
        self.halt();
        let summary = self.stats.summary();
        info!(
            "strider-wbc: control loop stopped after {} ticks ({} overruns, {} errors)",
            summary.ticks, summary.overruns, summary.errors
        );
        summary
    }

    /// Join the thread and stop the controller. Runs once.
    fn halt(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        if handle.join().is_err() {
            warn!("strider-wbc: control thread panicked");
        }
        self.controller.lock().stop();
    }
}

impl<R: RobotModel> Drop for ControlLoop<R> {
    fn drop(&mut self) {
        self.halt();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use strider_core::config::ControllerConfig;
    use strider_core::traits::NullTransport;
    use strider_core::types::{ControlMode, ControllerStatus};
    use strider_sim::{SimConfig, SimRobot};
    use strider_test_utils::RecordingTransport;

    fn shared_controller(dofs: usize) -> SharedController<SimRobot> {
        let robot = SimRobot::new(SimConfig {
            full_dofs: dofs,
            ..SimConfig::default()
        });
        shared(Controller::new(robot, ControllerConfig::with_full_dofs(dofs)).unwrap())
    }

    #[test]
    fn ticks_and_publishes_until_shutdown() {
        let controller = shared_controller(10);
        let recorder = RecordingTransport::new();
        let control =
            ControlLoop::spawn(controller, recorder.clone(), Duration::from_millis(1)).unwrap();
        thread::sleep(Duration::from_millis(30));
        let shared = Arc::clone(control.controller());
        let summary = control.shutdown();

        assert!(summary.ticks > 0);
        assert_eq!(summary.errors, 0);
        assert_eq!(recorder.published_count() as u64, summary.ticks);
        let c = shared.lock();
        assert_eq!(c.status(), ControllerStatus::Off);
        assert_eq!(c.robot().mode(), ControlMode::Position);
    }

    #[test]
    fn commands_land_between_ticks() {
        let controller = shared_controller(10);
        let control =
            ControlLoop::spawn(controller, NullTransport, Duration::from_millis(1)).unwrap();
        control.controller().lock().start().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(control.controller().lock().status(), ControllerStatus::On);

        let shared = Arc::clone(control.controller());
        control.shutdown();
        let c = shared.lock();
        let last = c.robot().commands().last().unwrap();
        assert_eq!(last.norm(), 0.0);
    }

    #[test]
    fn dropping_the_loop_stops_the_robot() {
        let controller = shared_controller(10);
        let shared = Arc::clone(&controller);
        let control = ControlLoop::spawn_with(
            controller,
            NullTransport,
            Duration::from_millis(1),
            |c| c.robot_mut().step(0.001),
        )
        .unwrap();
        control.controller().lock().start().unwrap();
        thread::sleep(Duration::from_millis(10));
        drop(control);

        let c = shared.lock();
        assert_eq!(c.status(), ControllerStatus::Off);
        assert_eq!(c.robot().mode(), ControlMode::Position);
        assert_eq!(c.robot().commands().last().unwrap().norm(), 0.0);
    }

    #[test]
    fn slow_ticks_count_as_overruns() {
        let controller = shared_controller(6);
        let control = ControlLoop::spawn_with(
            controller,
            NullTransport,
            Duration::from_millis(1),
            |_| thread::sleep(Duration::from_millis(3)),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(30));
        let summary = control.shutdown();
        assert!(summary.overruns > 0);
        assert!(summary.overruns <= summary.ticks);
    }

    #[test]
    fn after_tick_hook_steps_the_robot() {
        let controller = shared_controller(6);
        let steps = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&steps);
        let control = ControlLoop::spawn_with(
            controller,
            NullTransport,
            Duration::from_millis(1),
            move |c| {
                c.robot_mut().step(0.001);
                seen.fetch_add(1, Ordering::Relaxed);
            },
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        let summary = control.shutdown();
        assert_eq!(steps.load(Ordering::Relaxed), summary.ticks);
    }
}
