// Shared fixtures for the integration tests.
#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;

use tilebot::core::{CancelToken, GridGeometry, Notifier, SensorStore};
use tilebot::navigation::{MotorCommand, NavStatus, Planner, TileGraph};
use tilebot::{Actuator, ActuatorSink, MotorCommandSink};
use tilebot::config::PlannerConfig;

/// Records everything the planner publishes.
#[derive(Default)]
pub struct Recorder {
    commands: Mutex<Vec<MotorCommand>>,
    pulses: Mutex<Vec<(Actuator, bool)>>,
}

impl Recorder {
    pub fn commands(&self) -> Vec<MotorCommand> {
        self.commands.lock().clone()
    }

    pub fn last_command(&self) -> Option<MotorCommand> {
        self.commands.lock().last().copied()
    }

    pub fn take_commands(&self) -> Vec<MotorCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    pub fn pulses(&self) -> Vec<(Actuator, bool)> {
        self.pulses.lock().clone()
    }
}

impl MotorCommandSink for Recorder {
    fn send_command(&self, command: MotorCommand) {
        self.commands.lock().push(command);
    }
}

impl ActuatorSink for Recorder {
    fn set_actuator(&self, actuator: Actuator, on: bool) {
        self.pulses.lock().push((actuator, on));
    }
}

pub struct Rig {
    pub planner: Planner,
    pub store: Arc<SensorStore>,
    pub status: Arc<NavStatus>,
    pub recorder: Arc<Recorder>,
    pub cancel: CancelToken,
    pub notifier: Arc<Notifier>,
}

pub fn grid() -> GridGeometry {
    GridGeometry::new(6, 0.3, 0.075)
}

pub fn fast_config() -> PlannerConfig {
    PlannerConfig {
        scan_duration_ms: 30,
        actuator_dwell_ms: 1,
        wait_poll_ms: 2,
        ..PlannerConfig::default()
    }
}

pub fn rig(config: PlannerConfig) -> Rig {
    rig_with_motors(config, |recorder| recorder as Arc<dyn MotorCommandSink>)
}

/// Like [`rig`], with the motor sink wrapped around the recorder.
pub fn rig_with_motors<F>(config: PlannerConfig, motors: F) -> Rig
where
    F: FnOnce(Arc<Recorder>) -> Arc<dyn MotorCommandSink>,
{
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(SensorStore::new(grid()));
    let status = Arc::new(NavStatus::new());
    let recorder = Arc::new(Recorder::default());
    let notifier = Arc::new(Notifier::new());
    let cancel = CancelToken::new(Arc::clone(&notifier));
    let planner = Planner::new(
        TileGraph::new(grid()),
        Arc::clone(&store),
        motors(Arc::clone(&recorder)),
        recorder.clone(),
        Arc::clone(&status),
        cancel.clone(),
        config,
    );
    Rig {
        planner,
        store,
        status,
        recorder,
        cancel,
        notifier,
    }
}
