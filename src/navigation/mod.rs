//! Navigation system for tilebot
//!
//! This module turns grid destinations into motion:
//! - [`graph`]: tile topology and shortest paths
//! - [`planner`]: waypoint execution, obstacle handling and the scan window
//! - [`controller`]: PI heading mixer, turn control and the motor-command consumer
//! - [`feed`]: the single feed thread that owns the planner, and the mission-side handle

/// Motor control.
pub mod controller;
/// Feed thread and mission handle.
pub mod feed;
/// Tile graph.
pub mod graph;
/// Waypoint execution.
pub mod planner;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::core::types::{Heading, Side, TilePosition};

pub use controller::{DriveController, MotorDriver, Rotation, TurnController, WheelPwm, is_aligned};
pub use feed::{FeedEvent, FeedLoop, FeedMessage, NavHandle};
pub use graph::TileGraph;
pub use planner::{ArrivalOutcome, Planner, RouteOutcome};

/// Motor command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandKind {
    /// Zero both wheels.
    Stop,
    /// Hold a heading at a speed.
    Drive,
    /// Rotate in place to a heading.
    Turn,
}

/// Command sent from the planner to the motor consumer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorCommand {
    /// What to do.
    pub kind: CommandKind,
    /// Desired heading for DRIVE, target heading for TURN.
    pub heading: Heading,
    /// Metres per second. Zero for STOP and TURN.
    pub speed: f32,
}

impl MotorCommand {
    /// Zero speed, heading zero.
    pub fn stop() -> Self {
        MotorCommand {
            kind: CommandKind::Stop,
            heading: Heading::POS_X,
            speed: 0.0,
        }
    }

    /// Drive along `heading` at `speed`.
    pub fn drive(heading: Heading, speed: f32) -> Self {
        MotorCommand {
            kind: CommandKind::Drive,
            heading,
            speed,
        }
    }

    /// Rotate in place to `heading`.
    pub fn turn(heading: Heading) -> Self {
        MotorCommand {
            kind: CommandKind::Turn,
            heading,
            speed: 0.0,
        }
    }

    /// Everything except STOP moves the wheels.
    pub fn is_moving(&self) -> bool {
        self.kind != CommandKind::Stop
    }
}

/// Input of the motor consumer: commands from the planner, headings from the pose feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorInput {
    /// New command from the planner.
    Command(MotorCommand),
    /// Latest measured heading.
    Heading(Heading),
}

impl From<MotorCommand> for MotorInput {
    fn from(command: MotorCommand) -> Self {
        MotorInput::Command(command)
    }
}

/// Planner entry points the mission thread may request. They run on the feed thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavRequest {
    /// Route to `dest` from the current tile.
    DriveToTile {
        /// Destination.
        dest: TilePosition,
        /// Cruise speed (m/s).
        speed: f32,
        /// Crawl for a scan window on arrival.
        scan_on_reach: bool,
    },
    /// Abandon the current route.
    CancelDrive,
    /// Rotate in place without a route.
    Turn(Heading),
    /// Stop the wheels.
    Stop,
    /// Pulse the fan.
    PutOutFire,
    /// Pulse the indicator.
    SignalComplete,
}

/// How the planner reacts to a confirmed obstacle ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObstacleStrategy {
    /// Block the tile ahead and route around it on the graph.
    #[default]
    Replan,
    /// Side-step the tile ahead with a fixed bypass, then rejoin the route.
    Detour,
}

/// Resolved reaction for one obstacle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleResponse {
    /// Block the tile ahead and replan to the final destination.
    Replan,
    /// Side-step towards the given side.
    Detour(Side),
}

/// Open scan window, identified by its epoch.
#[derive(Debug, Default)]
struct ScanWindow {
    epoch: u64,
    open: bool,
}

/// Flags the feed thread publishes for mission-side waits.
///
/// The scan window sits behind a lock shared by the feed thread and the scan timer, so
/// closing a window and emitting its STOP happen as one step.
#[derive(Debug, Default)]
pub struct NavStatus {
    scan: Mutex<ScanWindow>,
    moving: AtomicBool,
    requests_sent: AtomicU64,
    requests_handled: AtomicU64,
}

impl NavStatus {
    /// All flags cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// A scan window is open.
    pub fn is_scanning(&self) -> bool {
        self.scan.lock().open
    }

    /// The last command published was DRIVE or TURN.
    pub fn is_moving(&self) -> bool {
        self.moving.load(Ordering::SeqCst)
    }

    pub(crate) fn set_moving(&self, moving: bool) {
        self.moving.store(moving, Ordering::SeqCst);
    }

    /// Opens a new scan window and returns its epoch.
    pub(crate) fn open_scan(&self) -> u64 {
        let mut scan = self.scan.lock();
        scan.epoch += 1;
        scan.open = true;
        scan.epoch
    }

    /// Closes the open window early. Returns false when none was open.
    ///
    /// Blocks while a timer is expiring a window, so its STOP is out before this returns.
    pub(crate) fn close_scan(&self) -> bool {
        let mut scan = self.scan.lock();
        if !scan.open {
            return false;
        }
        scan.epoch += 1;
        scan.open = false;
        true
    }

    /// Closes window `epoch` if it is still the open one, running `on_expire` under the
    /// scan lock. Returns false for a stale epoch.
    pub(crate) fn expire_scan<F: FnOnce()>(&self, epoch: u64, on_expire: F) -> bool {
        let mut scan = self.scan.lock();
        if !scan.open || scan.epoch != epoch {
            return false;
        }
        scan.open = false;
        self.set_moving(false);
        on_expire();
        true
    }

    /// Reserves a ticket for a request about to be sent.
    pub(crate) fn next_request_ticket(&self) -> u64 {
        self.requests_sent.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn mark_request_handled(&self) {
        self.requests_handled.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of requests the feed thread has processed.
    pub fn requests_handled(&self) -> u64 {
        self.requests_handled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MotorCommand::stop(), false)]
    #[case(MotorCommand::drive(Heading::POS_Y, 0.3), true)]
    #[case(MotorCommand::turn(Heading::NEG_X), true)]
    fn only_stop_is_stationary(#[case] command: MotorCommand, #[case] moving: bool) {
        assert_eq!(command.is_moving(), moving);
    }

    #[test]
    fn stop_zeroes_heading_and_speed() {
        let stop = MotorCommand::stop();
        assert_eq!(stop.heading.degrees(), 0);
        assert_eq!(stop.speed, 0.0);
    }

    #[test]
    fn stale_timer_cannot_close_a_newer_window() {
        let status = NavStatus::new();
        let first = status.open_scan();
        assert!(status.close_scan());
        let second = status.open_scan();

        let mut fired = false;
        assert!(!status.expire_scan(first, || fired = true));
        assert!(!fired);
        assert!(status.is_scanning());

        assert!(status.expire_scan(second, || fired = true));
        assert!(fired);
        assert!(!status.is_scanning());
        assert!(!status.close_scan());
    }

    #[test]
    fn strategy_parses_lowercase() {
        let strategy: ObstacleStrategy = serde_yaml::from_str("detour").unwrap();
        assert_eq!(strategy, ObstacleStrategy::Detour);
    }
}
