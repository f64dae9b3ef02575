// src/navigation/feed.rs
// The feed thread: the only caller of the planner. Sensor updates and mission requests
// arrive on one channel and are applied in order, then every waiter is woken.

use log::{debug, info, warn};
use nalgebra::Point2;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bus::{BusError, DetectionMsg, PositionMsg, Publisher, RangeMsg, Subscriber};
use crate::config::PlannerConfig;
use crate::core::state::SensorStore;
use crate::core::sync::{CancelToken, Notifier, WaitOutcome};
use crate::core::types::{Heading, MissionState, RangeReading, SensorSide, Side, TilePosition};
use crate::navigation::controller::is_aligned;
use crate::navigation::planner::Planner;
use crate::navigation::{NavRequest, NavStatus, ObstacleResponse, ObstacleStrategy};

/// Sensor update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedEvent {
    /// Pose from the position feed.
    Position(PositionMsg),
    /// One range sensor reading.
    Range(RangeMsg),
    /// Flame or survivor detector output.
    Detection(DetectionMsg),
}

/// Anything the feed thread consumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedMessage {
    /// Sensor update.
    Event(FeedEvent),
    /// Mission request.
    Request(NavRequest),
}

impl From<FeedEvent> for FeedMessage {
    fn from(event: FeedEvent) -> Self {
        FeedMessage::Event(event)
    }
}

impl From<NavRequest> for FeedMessage {
    fn from(request: NavRequest) -> Self {
        FeedMessage::Request(request)
    }
}

/// Owns the planner and applies feed messages to it and the store.
pub struct FeedLoop {
    planner: Planner,
    store: Arc<SensorStore>,
    status: Arc<NavStatus>,
    notifier: Arc<Notifier>,
    last_tile: TilePosition,
}

impl FeedLoop {
    /// Feed loop driving `planner`, waking waiters on `notifier`.
    pub fn new(planner: Planner, store: Arc<SensorStore>, status: Arc<NavStatus>, notifier: Arc<Notifier>) -> Self {
        FeedLoop {
            planner,
            store,
            status,
            notifier,
            last_tile: TilePosition::INVALID,
        }
    }

    /// Planner owned by this loop.
    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Applies one message and wakes every waiter.
    pub fn handle_message(&mut self, message: FeedMessage) {
        match message {
            FeedMessage::Event(event) => self.handle_event(event),
            FeedMessage::Request(request) => self.handle_request(request),
        }
        self.notifier.notify();
    }

    /// Applies one sensor update.
    pub fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Position(position) => self.on_position(position),
            FeedEvent::Range(range) => self.on_range(range),
            FeedEvent::Detection(detection) => self.on_detection(detection),
        }
    }

    /// Runs one mission request on the planner.
    pub fn handle_request(&mut self, request: NavRequest) {
        debug!("Request {:?}", request);
        match request {
            NavRequest::DriveToTile { dest, speed, scan_on_reach } => {
                let current = self.store.current_tile();
                self.planner.drive_to_tile(current, dest, speed, scan_on_reach);
            }
            NavRequest::CancelDrive => self.planner.cancel_drive(),
            NavRequest::Turn(heading) => {
                self.planner.interrupt_scan();
                self.planner.publish_turn(heading);
            }
            NavRequest::Stop => {
                self.planner.interrupt_scan();
                self.planner.publish_stop();
            }
            NavRequest::PutOutFire => self.planner.put_out_fire(),
            NavRequest::SignalComplete => self.planner.signal_complete(),
        }
        self.status.mark_request_handled();
    }

    fn on_position(&mut self, position: PositionMsg) {
        let heading = Heading::new(position.heading);
        self.store.set_current_heading(heading);
        self.store
            .set_current_position(Point2::new(position.x * 100.0, position.y * 100.0));

        let grid = *self.store.grid();
        if let Some(x) = grid.quantize_axis(position.x) {
            self.store.set_current_tile_x(x);
        }
        if let Some(y) = grid.quantize_axis(position.y) {
            self.store.set_current_tile_y(y);
        }
        let current = self.store.current_tile();
        let previous = std::mem::replace(&mut self.last_tile, current);

        let config = self.planner.config().clone();

        // Turn-to-drive hand-off
        if let Some(target) = self.store.target_heading() {
            if is_aligned(target, heading, config.heading_tolerance_deg) {
                debug!("Aligned at {}, driving", heading);
                self.planner.publish_stop();
                self.planner.publish_drive(target, self.planner.drive_speed());
                self.store.invalidate_target_heading();
            }
            return;
        }

        if self.planner.has_route() {
            let front = self.store.range(SensorSide::Front);
            if front.is_within(config.obstacle_threshold_cm) && self.store.detection().is_detected() {
                self.planner.publish_stop();
                let response = self.obstacle_response(config.obstacle_strategy, &config);
                self.planner.on_obstacle_detected(current, heading, response);
                return;
            }

            let moved = !previous.is_invalid() && previous != current;
            if current == self.store.target_tile() || moved {
                self.planner.on_arrival_at_front(current);
            }
        }
    }

    fn obstacle_response(&self, strategy: ObstacleStrategy, config: &PlannerConfig) -> ObstacleResponse {
        match strategy {
            ObstacleStrategy::Replan => ObstacleResponse::Replan,
            ObstacleStrategy::Detour => {
                let clear = |side| {
                    self.store
                        .range(side)
                        .is_clear_beyond(config.detour_clearance_cm)
                };
                if clear(SensorSide::Left) {
                    ObstacleResponse::Detour(Side::Left)
                } else if clear(SensorSide::Right) {
                    ObstacleResponse::Detour(Side::Right)
                } else {
                    ObstacleResponse::Replan
                }
            }
        }
    }

    fn on_range(&mut self, range: RangeMsg) {
        let reading = RangeReading::from_raw(range.distance_cm);
        if !reading.is_known() && self.store.range(range.side).is_known() {
            warn!("{:?} range lost ({:?})", range.side, reading);
        }
        self.store.set_range(range.side, reading);
        self.store.mark_range_received(range.side);
    }

    fn on_detection(&mut self, detection: DetectionMsg) {
        match detection {
            DetectionMsg::Fire { side, detected } => {
                let rising = detected && !self.store.fire(side);
                self.store.set_fire(side, detected);
                if let (true, Some(lateral)) = (rising, side.lateral()) {
                    self.store.update_flame_tile_from_last_point(lateral);
                }
            }
            DetectionMsg::Survivors(class) => {
                self.store.set_detection(class);
                if class.is_detected() && self.planner.is_scanning() {
                    info!("{:?} found while scanning", class);
                    self.planner.interrupt_scan();
                    self.planner.signal_complete();
                }
            }
        }
    }

    /// Consumes the feed until cancelled or every sender is gone, then stops the wheels.
    pub fn run(mut self, feed: Subscriber<FeedMessage>, cancel: CancelToken) {
        info!("Feed loop listening on `{}`", feed.topic());
        let poll = self.planner.config().wait_poll().max(Duration::from_millis(20));
        while !cancel.is_cancelled() {
            match feed.recv_timeout(poll) {
                Ok(Some(message)) => self.handle_message(message),
                Ok(None) => {}
                Err(err) => {
                    info!("Feed loop stopping: {}", err);
                    break;
                }
            }
        }
        self.planner.cancel_drive();
        self.notifier.notify();
    }
}

/// Mission-side handle. Requests run on the feed thread; waits block the caller until the
/// feed reports the expected state, a timeout elapses, or the kill flag is raised.
#[derive(Clone)]
pub struct NavHandle {
    requests: Publisher<FeedMessage>,
    store: Arc<SensorStore>,
    status: Arc<NavStatus>,
    cancel: CancelToken,
    config: PlannerConfig,
}

impl NavHandle {
    /// Handle sending requests on `requests`.
    pub fn new(
        requests: Publisher<FeedMessage>,
        store: Arc<SensorStore>,
        status: Arc<NavStatus>,
        cancel: CancelToken,
        config: PlannerConfig,
    ) -> Self {
        NavHandle {
            requests,
            store,
            status,
            cancel,
            config,
        }
    }

    /// Shared sensor store.
    pub fn store(&self) -> &Arc<SensorStore> {
        &self.store
    }

    /// Flags published by the feed thread.
    pub fn status(&self) -> &Arc<NavStatus> {
        &self.status
    }

    /// Kill flag every wait observes.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Queues a request without waiting for it.
    pub fn request(&self, request: NavRequest) -> Result<(), BusError> {
        self.requests.publish(request.into())
    }

    /// Queues a request and waits until the feed thread has applied it.
    pub fn request_and_ack(&self, request: NavRequest, timeout: Option<Duration>) -> Result<WaitOutcome, BusError> {
        let ticket = self.status.next_request_ticket();
        self.request(request)?;
        Ok(self.wait(|| self.status.requests_handled() >= ticket, timeout))
    }

    fn wait<F: FnMut() -> bool>(&self, predicate: F, timeout: Option<Duration>) -> WaitOutcome {
        self.cancel.wait_until(predicate, timeout, self.config.wait_poll())
    }

    /// Drives to `dest` and waits for the route to finish, including any scan window.
    ///
    /// `Satisfied` only says the planner went idle; compare the current tile with `dest`
    /// to tell arrival from an unreachable destination.
    pub fn drive_and_wait(
        &self,
        dest: TilePosition,
        speed: f32,
        scan_on_reach: bool,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome, BusError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let request = NavRequest::DriveToTile { dest, speed, scan_on_reach };
        let acked = self.request_and_ack(request, timeout)?;
        if !acked.is_satisfied() {
            return Ok(acked);
        }
        let remaining = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
        Ok(self.wait(
            || {
                let idle = !self.status.is_moving() && !self.status.is_scanning();
                idle && (!self.store.is_target_tile_valid() || self.store.current_tile() == dest)
            },
            remaining,
        ))
    }

    /// Waits until the robot is quantised onto `tile`.
    pub fn wait_until_at_tile(&self, tile: TilePosition, timeout: Option<Duration>) -> WaitOutcome {
        self.wait(|| self.store.current_tile() == tile, timeout)
    }

    /// Waits for the current scan window to close.
    pub fn wait_for_scan(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.wait(|| !self.status.is_scanning(), timeout)
    }

    /// Waits until the heading is within tolerance of `heading`.
    pub fn wait_until_heading(&self, heading: Heading, timeout: Option<Duration>) -> WaitOutcome {
        let tolerance = self.config.heading_tolerance_deg;
        self.wait(|| is_aligned(heading, self.store.current_heading(), tolerance), timeout)
    }

    /// Turns in place to `heading` and stops once aligned.
    pub fn turn_and_wait(&self, heading: Heading, timeout: Option<Duration>) -> Result<WaitOutcome, BusError> {
        self.request(NavRequest::Turn(heading))?;
        let outcome = self.wait_until_heading(heading, timeout);
        self.request(NavRequest::Stop)?;
        Ok(outcome)
    }

    /// Drives back to the recorded home tile. `None` when no home tile was recorded.
    pub fn drive_home(&self, speed: f32, timeout: Option<Duration>) -> Result<Option<WaitOutcome>, BusError> {
        let home = self.store.home_tile();
        if home.is_invalid() {
            warn!("No home tile recorded");
            return Ok(None);
        }
        self.store.set_mission_state(MissionState::ReturnHome);
        self.drive_and_wait(home, speed, false, timeout).map(Some)
    }

    /// Waits until every range sensor has reported once.
    pub fn wait_for_ranges(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.wait(|| self.store.all_ranges_received(), timeout)
    }
}
