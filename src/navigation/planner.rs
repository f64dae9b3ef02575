// src/navigation/planner.rs
// Executes grid routes: owns the queue of legs, turns each leg into TURN/DRIVE/STOP
// commands, advances on arrival, reroutes around obstacles and runs the timed scan window.
//
// Only the feed thread calls into a Planner. The scan timer is the one concurrent actor: it
// closes its window and sends STOP under the scan lock, and only while its epoch is current.

use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::bus::{Actuator, ActuatorSink, MotorCommandSink};
use crate::config::PlannerConfig;
use crate::core::state::SensorStore;
use crate::core::sync::{CancelToken, schedule_once};
use crate::core::types::{Cardinal, Heading, Side, TilePosition};
use crate::navigation::graph::TileGraph;
use crate::navigation::{MotorCommand, NavStatus, ObstacleResponse};

/// Result of starting or rerouting a drive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RouteOutcome {
    /// Already on the destination; nothing was sent.
    AlreadyThere,
    /// Turning towards the first leg.
    Started {
        /// Tile the robot now drives towards.
        next: TilePosition,
        /// Heading of that leg.
        heading: Heading,
    },
    /// No path exists. STOP was sent and the targets cleared.
    Unreachable,
    /// There was no route to reroute.
    NoActiveRoute,
}

/// Result of reaching the front leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArrivalOutcome {
    /// No route is active.
    Idle,
    /// The reported tile is not the expected one. STOP was sent and the route dropped.
    Mismatch {
        /// Front of the queue.
        expected: TilePosition,
        /// Tile the feed reported.
        actual: TilePosition,
    },
    /// Turning towards the next leg.
    Continue {
        /// New front of the queue.
        next: TilePosition,
        /// Heading of the new leg.
        heading: Heading,
    },
    /// Final leg reached with a scan request; crawling forward.
    Scanning,
    /// Final leg reached. STOP was sent.
    Completed,
}

/// Waypoint executor.
pub struct Planner {
    graph: TileGraph,
    legs: VecDeque<TilePosition>,
    store: Arc<SensorStore>,
    motors: Arc<dyn MotorCommandSink>,
    actuators: Arc<dyn ActuatorSink>,
    status: Arc<NavStatus>,
    cancel: CancelToken,
    config: PlannerConfig,
    drive_speed: f32,
}

impl Planner {
    /// Idle planner cruising at the configured maximum speed.
    pub fn new(
        graph: TileGraph,
        store: Arc<SensorStore>,
        motors: Arc<dyn MotorCommandSink>,
        actuators: Arc<dyn ActuatorSink>,
        status: Arc<NavStatus>,
        cancel: CancelToken,
        config: PlannerConfig,
    ) -> Self {
        let drive_speed = config.max_drive_speed;
        Planner {
            graph,
            legs: VecDeque::new(),
            store,
            motors,
            actuators,
            status,
            cancel,
            config,
            drive_speed,
        }
    }

    /// Tile graph with every reported obstacle removed.
    pub fn graph(&self) -> &TileGraph {
        &self.graph
    }

    /// Mutable tile graph, for marking known obstacles.
    pub fn graph_mut(&mut self) -> &mut TileGraph {
        &mut self.graph
    }

    /// Planner parameters.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Remaining legs, front first.
    pub fn legs(&self) -> &VecDeque<TilePosition> {
        &self.legs
    }

    /// Last leg of the active route.
    pub fn final_destination(&self) -> Option<TilePosition> {
        self.legs.back().copied()
    }

    /// Whether any legs remain.
    pub fn has_route(&self) -> bool {
        !self.legs.is_empty()
    }

    /// Cruise speed of the active route.
    pub fn drive_speed(&self) -> f32 {
        self.drive_speed
    }

    /// Whether a scan window is open.
    pub fn is_scanning(&self) -> bool {
        self.status.is_scanning()
    }

    /// Whether the last command moves the wheels.
    pub fn is_moving(&self) -> bool {
        self.status.is_moving()
    }

    fn emit(&self, command: MotorCommand) {
        self.status.set_moving(command.is_moving());
        self.motors.send_command(command);
    }

    /// Sends STOP.
    pub fn publish_stop(&self) {
        self.emit(MotorCommand::stop());
    }

    /// Sends DRIVE, clamping the speed to the configured maximum.
    pub fn publish_drive(&self, heading: Heading, speed: f32) {
        let speed = speed.clamp(0.0, self.config.max_drive_speed);
        self.emit(MotorCommand::drive(heading, speed));
    }

    /// Sends TURN towards `heading`.
    pub fn publish_turn(&self, heading: Heading) {
        self.emit(MotorCommand::turn(heading));
    }

    /// Plans a route from `current` to `dest` and turns towards the first leg.
    pub fn drive_to_tile(
        &mut self,
        current: TilePosition,
        dest: TilePosition,
        speed: f32,
        scan_on_reach: bool,
    ) -> RouteOutcome {
        if current == dest {
            info!("Already at {}, ignoring drive request", dest);
            return RouteOutcome::AlreadyThere;
        }
        self.interrupt_scan();
        self.drive_speed = speed.clamp(0.0, self.config.max_drive_speed);

        let mut path = self.graph.shortest_path(current, dest);
        if let Some(last) = path.last_mut() {
            last.scan_on_reach = scan_on_reach;
        }
        info!("Drive {} -> {} ({} legs, scan: {})", current, dest, path.len(), scan_on_reach);
        self.follow(current, path)
    }

    /// Installs `path` as the route and turns towards its first leg.
    fn follow(&mut self, current: TilePosition, path: Vec<TilePosition>) -> RouteOutcome {
        self.legs = path.into();
        match self.legs.front().copied() {
            Some(next) => {
                let heading = Cardinal::between(current, next).heading();
                self.aim_at(next, heading);
                RouteOutcome::Started { next, heading }
            }
            None => {
                warn!("No path from {}; stopping", current);
                self.publish_stop();
                self.store.invalidate_target_heading();
                self.store.invalidate_target_tile();
                RouteOutcome::Unreachable
            }
        }
    }

    fn aim_at(&self, next: TilePosition, heading: Heading) {
        self.store.set_target_tile(next);
        self.store.set_target_heading(Some(heading));
        self.publish_turn(heading);
    }

    /// Advances the route after the feed reported `current` as the front leg.
    pub fn on_arrival_at_front(&mut self, current: TilePosition) -> ArrivalOutcome {
        let Some(expected) = self.legs.front().copied() else {
            return ArrivalOutcome::Idle;
        };
        if current != expected {
            warn!("Arrived at {} while expecting {}; dropping route", current, expected);
            self.legs.clear();
            self.publish_stop();
            self.store.invalidate_target_tile();
            self.store.invalidate_target_heading();
            return ArrivalOutcome::Mismatch { expected, actual: current };
        }

        let Some(reached) = self.legs.pop_front() else {
            return ArrivalOutcome::Idle;
        };
        if let Some(next) = self.legs.front().copied() {
            let heading = Cardinal::between(reached, next).heading();
            debug!("Reached {}, next leg {} at {}", reached, next, heading);
            self.aim_at(next, heading);
            return ArrivalOutcome::Continue { next, heading };
        }

        if reached.scan_on_reach {
            self.begin_scan();
            ArrivalOutcome::Scanning
        } else {
            info!("Reached destination {}", reached);
            self.publish_stop();
            self.store.invalidate_target_tile();
            self.store.invalidate_target_heading();
            ArrivalOutcome::Completed
        }
    }

    /// Opens a scan window: crawl along the current heading until the timer closes it.
    fn begin_scan(&mut self) {
        let epoch = self.status.open_scan();
        self.store.invalidate_target_heading();
        self.store.invalidate_target_tile();

        let heading = self.store.current_heading();
        let crawl = self.drive_speed * self.config.scan_speed_ratio;
        info!("Scanning at {} for {:?}", heading, self.config.scan_duration());
        self.publish_drive(heading, crawl);

        let status = Arc::clone(&self.status);
        let motors = Arc::clone(&self.motors);
        let notifier = Arc::clone(self.cancel.notifier());
        let timer = schedule_once("scan-timer", self.config.scan_duration(), self.cancel.clone(), move || {
            let expired = status.expire_scan(epoch, || motors.send_command(MotorCommand::stop()));
            if expired {
                info!("Scan window closed");
                notifier.notify();
            }
        });
        if let Err(err) = timer {
            warn!("Could not start scan timer: {}", err);
            self.interrupt_scan();
            self.publish_stop();
        }
    }

    /// Closes the scan window early. A pending timer for it becomes a no-op, and a timer
    /// already expiring it has sent its STOP by the time this returns.
    pub fn interrupt_scan(&mut self) {
        if self.status.close_scan() {
            debug!("Scan interrupted");
        }
    }

    /// Reacts to a confirmed obstacle one tile ahead of `current` along `heading`.
    pub fn on_obstacle_detected(
        &mut self,
        current: TilePosition,
        heading: Heading,
        response: ObstacleResponse,
    ) -> RouteOutcome {
        let Some(dest) = self.final_destination() else {
            warn!("Obstacle ahead of {} with no active route", current);
            return RouteOutcome::NoActiveRoute;
        };
        let forward = heading.cardinal();
        let blocked = current.offset(forward, 1);
        warn!("Obstacle at {} (from {} facing {}), response {:?}", blocked, current, heading, response);
        self.graph.block_tile(blocked);

        if let ObstacleResponse::Detour(side) = response {
            match self.detour(current, forward, side, dest) {
                Some(path) => return self.follow(current, path),
                None => info!("Detour to the {} not possible, replanning", side),
            }
        }

        let mut path = self.graph.shortest_path(current, dest);
        if let Some(last) = path.last_mut() {
            last.scan_on_reach = dest.scan_on_reach;
        }
        self.follow(current, path)
    }

    /// Side-steps the tile ahead: one tile towards `side`, two forward, one back.
    /// The bypass rejoins the old route where it lands on it, otherwise it is routed
    /// on to `dest` over the graph.
    fn detour(
        &self,
        current: TilePosition,
        forward: Cardinal,
        side: Side,
        dest: TilePosition,
    ) -> Option<Vec<TilePosition>> {
        let lateral = forward.rotated(side);
        let first = current.offset(lateral, 1);
        let second = first.offset(forward, 1);
        let third = second.offset(forward, 1);
        let rejoin = third.offset(lateral.opposite(), 1);
        let mut bypass = vec![first, second, third, rejoin];

        let mut from = current;
        for &tile in &bypass {
            if !self.graph.has_edge(from, tile) {
                return None;
            }
            from = tile;
        }

        if let Some(at) = bypass.iter().position(|&tile| tile == dest) {
            bypass.truncate(at + 1);
            if let Some(last) = bypass.last_mut() {
                last.scan_on_reach = dest.scan_on_reach;
            }
            return Some(bypass);
        }

        if let Some(at) = self.legs.iter().position(|&tile| tile == rejoin) {
            bypass.pop();
            bypass.extend(self.legs.iter().skip(at).copied());
            return Some(bypass);
        }

        let onward = self.graph.shortest_path(rejoin, dest);
        if onward.is_empty() {
            return None;
        }
        bypass.extend(onward);
        if let Some(last) = bypass.last_mut() {
            last.scan_on_reach = dest.scan_on_reach;
        }
        Some(bypass)
    }

    /// Abandons the route and stops.
    pub fn cancel_drive(&mut self) {
        info!("Drive cancelled with {} legs left", self.legs.len());
        self.interrupt_scan();
        self.legs.clear();
        self.publish_stop();
        self.store.invalidate_target_tile();
        self.store.invalidate_target_heading();
    }

    /// Stops and pulses the fan for the configured dwell.
    pub fn put_out_fire(&mut self) {
        info!("Putting out fire");
        self.pulse(Actuator::Fan);
    }

    /// Stops and pulses the indicator for the configured dwell.
    pub fn signal_complete(&mut self) {
        info!("Signalling completion");
        self.pulse(Actuator::Indicator);
    }

    // Blocks the calling thread for the dwell
    fn pulse(&mut self, actuator: Actuator) {
        self.publish_stop();
        self.actuators.set_actuator(actuator, true);
        if !self.cancel.sleep(self.config.actuator_dwell()) {
            debug!("{:?} pulse cut short", actuator);
        }
        self.actuators.set_actuator(actuator, false);
    }
}
