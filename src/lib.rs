//! Tilebot - tile-grid navigation core for a differential-drive robot
//!
//! This library plans routes over an `N x N` tile grid, executes them as TURN/DRIVE/STOP
//! motor commands, reroutes around obstacles found on the way, and mixes commands into
//! wheel PWM with a PI heading loop.
//!
//! [`TileBot::start`] wires the pieces into two threads:
//! - the feed thread owns the [`Planner`] and applies sensor updates and mission requests
//! - the motor thread runs the [`MotorDriver`] on commands and headings
//!
//! Mission code talks to the feed thread through a [`NavHandle`].

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// In-process topics and the message types carried on them.
pub mod bus;
/// Parameter file and validation.
pub mod config;
/// Grid types, the shared sensor store and thread synchronisation.
pub mod core;
/// Route planning, execution and motor control.
pub mod navigation;
/// Simulated differential-drive plant.
pub mod sim;

use log::{error, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub use crate::bus::{Actuator, ActuatorSink, BusError, DetectionMsg, MotorCommandSink, PositionMsg, RangeMsg};
pub use crate::config::{ConfigError, TileBotConfig};
pub use crate::core::{CancelToken, Heading, SensorStore, TilePosition, WaitOutcome};
pub use crate::navigation::{MotorCommand, MotorDriver, NavHandle, NavRequest, Planner, TileGraph, WheelPwm};

use crate::bus::{Publisher, Subscriber};
use crate::core::{GridGeometry, Notifier, SensorSide};
use crate::navigation::{FeedEvent, FeedLoop, FeedMessage, MotorInput, NavStatus};

/// Errors surfaced while setting up or tearing down a tilebot process.
#[derive(Debug, thiserror::Error)]
pub enum TileBotError {
    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// File or thread spawn failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed configuration file.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// A topic closed underneath a caller.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    /// A worker thread panicked.
    #[error("thread `{0}` panicked")]
    ThreadPanicked(String),
}

/// Producer side of the sensor feeds.
///
/// Positions go to the feed thread and, as headings, to the motor thread.
#[derive(Clone)]
pub struct SensorFeed {
    feed: Publisher<FeedMessage>,
    motor: Publisher<MotorInput>,
}

impl SensorFeed {
    /// Publishes a pose from the position feed.
    pub fn publish_position(&self, position: PositionMsg) -> Result<(), BusError> {
        self.feed.publish(FeedEvent::Position(position).into())?;
        self.motor.publish(MotorInput::Heading(Heading::new(position.heading)))
    }

    /// Publishes one range reading. NaN marks a timeout.
    pub fn publish_range(&self, side: SensorSide, distance_cm: f32) -> Result<(), BusError> {
        self.feed
            .publish(FeedEvent::Range(RangeMsg { side, distance_cm }).into())
    }

    /// Publishes a detector output.
    pub fn publish_detection(&self, detection: DetectionMsg) -> Result<(), BusError> {
        self.feed.publish(FeedEvent::Detection(detection).into())
    }
}

/// A running navigation core.
pub struct TileBot {
    config: TileBotConfig,
    store: Arc<SensorStore>,
    cancel: CancelToken,
    feeds: SensorFeed,
    nav: NavHandle,
    threads: Vec<JoinHandle<()>>,
}

impl TileBot {
    /// Validates `config` and spawns the feed and motor threads.
    ///
    /// Returns the runtime and the wheel PWM output of the motor thread.
    pub fn start(
        config: TileBotConfig,
        actuators: Arc<dyn ActuatorSink>,
    ) -> Result<(TileBot, Subscriber<WheelPwm>), TileBotError> {
        config.validate()?;
        let grid = GridGeometry::from(&config.grid);
        let store = Arc::new(SensorStore::new(grid));
        let notifier = Arc::new(Notifier::new());
        let cancel = CancelToken::new(Arc::clone(&notifier));
        let status = Arc::new(NavStatus::new());

        let (feed_tx, feed_rx) = bus::channel::<FeedMessage>("feed");
        let (motor_tx, motor_rx) = bus::channel::<MotorInput>("motor_command");
        let (wheel_tx, wheel_rx) = bus::channel::<WheelPwm>("wheel_pwm");

        let planner = Planner::new(
            TileGraph::new(grid),
            Arc::clone(&store),
            Arc::new(motor_tx.clone()),
            actuators,
            Arc::clone(&status),
            cancel.clone(),
            config.planner.clone(),
        );
        let feed_loop = FeedLoop::new(planner, Arc::clone(&store), Arc::clone(&status), notifier);
        let feed_cancel = cancel.clone();
        let feed_thread = thread::Builder::new()
            .name("feed".into())
            .spawn(move || feed_loop.run(feed_rx, feed_cancel))?;

        let driver = MotorDriver::new(config.motor.clone());
        let motor_cancel = cancel.clone();
        let motor_thread = thread::Builder::new().name("motor".into()).spawn(move || {
            if let Err(err) = driver.run(motor_rx, wheel_tx, motor_cancel) {
                error!("Motor driver failed: {}", err);
            }
        });
        let motor_thread = match motor_thread {
            Ok(handle) => handle,
            Err(err) => {
                cancel.cancel();
                return Err(err.into());
            }
        };

        let nav = NavHandle::new(
            feed_tx.clone(),
            Arc::clone(&store),
            status,
            cancel.clone(),
            config.planner.clone(),
        );
        info!("Tilebot started on a {0}x{0} grid", config.grid.size);
        let bot = TileBot {
            config,
            store,
            cancel,
            feeds: SensorFeed { feed: feed_tx, motor: motor_tx },
            nav,
            threads: vec![feed_thread, motor_thread],
        };
        Ok((bot, wheel_rx))
    }

    /// Validated configuration the runtime started with.
    pub fn config(&self) -> &TileBotConfig {
        &self.config
    }

    /// Mission-side handle.
    pub fn nav_handle(&self) -> NavHandle {
        self.nav.clone()
    }

    /// Shared sensor store.
    pub fn store(&self) -> &Arc<SensorStore> {
        &self.store
    }

    /// Producer side of the sensor feeds.
    pub fn feeds(&self) -> SensorFeed {
        self.feeds.clone()
    }

    /// Kill flag shared by every thread.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Raises the kill flag and joins both threads.
    pub fn shutdown(self) -> Result<(), TileBotError> {
        info!("Shutting down");
        self.cancel.cancel();
        let mut result = Ok(());
        for handle in self.threads {
            let name = handle.thread().name().unwrap_or("unnamed").to_string();
            if handle.join().is_err() {
                error!("Thread `{}` panicked", name);
                result = Err(TileBotError::ThreadPanicked(name));
            }
        }
        result
    }
}
