//! In-process message bus for tilebot.
//!
//! This module carries every boundary crossing of the navigation core:
//! - Position, range and detection feeds coming in
//! - Motor commands and actuator pulses going out
//! - The sink traits the planner publishes through, so tests can swap the transport

mod publisher;
mod subscriber;

use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use thiserror::Error;

use crate::core::types::{DetectionClass, SensorSide};
use crate::navigation::MotorCommand;

pub use publisher::Publisher;
pub use subscriber::Subscriber;

/// Bus failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The other end of the topic has been dropped.
    #[error("topic `{0}` disconnected")]
    Disconnected(String),
}

/// Creates a connected publisher/subscriber pair for `topic`.
pub fn channel<T>(topic: &str) -> (Publisher<T>, Subscriber<T>) {
    let (sender, receiver) = mpsc::channel();
    (Publisher::new(topic, sender), Subscriber::new(topic, receiver))
}

/// Pose from the position feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionMsg {
    /// Metres along +X.
    pub x: f32,
    /// Metres along +Y.
    pub y: f32,
    /// Degrees, any range; normalised on receipt.
    pub heading: i32,
}

/// One range sensor reading. NaN marks a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeMsg {
    /// Which sensor reported.
    pub side: SensorSide,
    /// Distance in centimetres.
    pub distance_cm: f32,
}

/// Detector outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionMsg {
    /// Fire sensor state on one side.
    Fire {
        /// Which sensor reported.
        side: SensorSide,
        /// Whether it sees a flame.
        detected: bool,
    },
    /// Survivor/building classifier output.
    Survivors(DetectionClass),
}

/// Pulsed outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actuator {
    /// Extinguisher fan.
    Fan,
    /// Completion indicator LED.
    Indicator,
}

/// Actuator state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorPulse {
    /// Target output.
    pub actuator: Actuator,
    /// New state.
    pub on: bool,
}

/// Where the planner sends motor commands.
#[cfg_attr(test, mockall::automock)]
pub trait MotorCommandSink: Send + Sync {
    /// Delivers one command. Transport failures are logged, never returned.
    fn send_command(&self, command: MotorCommand);
}

/// Where the planner toggles the fan and indicator.
#[cfg_attr(test, mockall::automock)]
pub trait ActuatorSink: Send + Sync {
    /// Switches one actuator.
    fn set_actuator(&self, actuator: Actuator, on: bool);
}

impl<T> MotorCommandSink for Publisher<T>
where
    T: From<MotorCommand> + Send,
{
    fn send_command(&self, command: MotorCommand) {
        if let Err(err) = self.publish(T::from(command)) {
            log::warn!("Dropped {:?}: {}", command, err);
        }
    }
}

impl ActuatorSink for Publisher<ActuatorPulse> {
    fn set_actuator(&self, actuator: Actuator, on: bool) {
        if let Err(err) = self.publish(ActuatorPulse { actuator, on }) {
            log::warn!("Dropped {:?} -> {}: {}", actuator, on, err);
        }
    }
}
