// core/state.rs

// Shared sensor and mission state. Every field sits behind its own lock and each accessor
// takes only that lock for the duration of the call, so readers never block the feed thread
// for longer than a single copy. Two reads are never consistent with each other; callers that
// need a combined view re-check instead of trusting an earlier read.

use log::{debug, info};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};

use super::types::{
    ContinuousPosition, DetectionClass, GridGeometry, Heading, MissionState, RangeReading, SensorSide,
    Side, TilePosition,
};

const ALL_RANGES: u8 = 0x07;

/// Points of interest found during a sweep, in discovery order.
#[derive(Debug, Default, Clone)]
struct PoiQueue {
    queue: VecDeque<TilePosition>,
    history: Vec<TilePosition>,
}

/// Copy of every field, each read under its own lock.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    /// Last quantised tile.
    pub current_tile: TilePosition,
    /// Last position in centimetres.
    pub current_position: ContinuousPosition,
    /// Last heading.
    pub current_heading: Heading,
    /// Tile the robot is driving towards.
    pub target_tile: TilePosition,
    /// Heading a pending turn should reach.
    pub target_heading: Option<Heading>,
    /// Front range.
    pub front: RangeReading,
    /// Left range.
    pub left: RangeReading,
    /// Right range.
    pub right: RangeReading,
    /// Fire flags (front, left, right).
    pub fire: [bool; 3],
    /// Latest detection class.
    pub detection: DetectionClass,
    /// Mission phase.
    pub mission_state: MissionState,
}

/// Shared repository of the robot's believed state.
#[derive(Debug)]
pub struct SensorStore {
    grid: GridGeometry,
    current_tile: Mutex<TilePosition>,
    current_position: Mutex<ContinuousPosition>,
    current_heading: Mutex<Heading>,
    target_tile: Mutex<TilePosition>,
    target_heading: Mutex<Option<Heading>>,
    front_range: Mutex<RangeReading>,
    left_range: Mutex<RangeReading>,
    right_range: Mutex<RangeReading>,
    front_fire: Mutex<bool>,
    left_fire: Mutex<bool>,
    right_fire: Mutex<bool>,
    detection: Mutex<DetectionClass>,
    mission_state: Mutex<MissionState>,
    points_of_interest: Mutex<PoiQueue>,
    home_tile: Mutex<TilePosition>,
    flame_tile: Mutex<TilePosition>,
    ranges_received: AtomicU8,
}

impl SensorStore {
    /// Creates a store holding the start-of-course defaults: no tile, heading 90°, no ranges.
    pub fn new(grid: GridGeometry) -> Self {
        SensorStore {
            grid,
            current_tile: Mutex::new(TilePosition::INVALID),
            current_position: Mutex::new(ContinuousPosition::origin()),
            current_heading: Mutex::new(Heading::default()),
            target_tile: Mutex::new(TilePosition::INVALID),
            target_heading: Mutex::new(None),
            front_range: Mutex::new(RangeReading::NoData),
            left_range: Mutex::new(RangeReading::NoData),
            right_range: Mutex::new(RangeReading::NoData),
            front_fire: Mutex::new(false),
            left_fire: Mutex::new(false),
            right_fire: Mutex::new(false),
            detection: Mutex::new(DetectionClass::None),
            mission_state: Mutex::new(MissionState::Idle),
            points_of_interest: Mutex::new(PoiQueue::default()),
            home_tile: Mutex::new(TilePosition::INVALID),
            flame_tile: Mutex::new(TilePosition::INVALID),
            ranges_received: AtomicU8::new(0),
        }
    }

    /// Grid the store quantises positions against.
    pub fn grid(&self) -> &GridGeometry {
        &self.grid
    }

    /// Tile the robot was last quantised onto.
    pub fn current_tile(&self) -> TilePosition {
        *self.current_tile.lock()
    }

    /// Overwrites both tile axes.
    pub fn set_current_tile(&self, tile: TilePosition) {
        *self.current_tile.lock() = tile;
    }

    /// Updates one axis of the current tile, leaving the other untouched.
    pub fn set_current_tile_x(&self, x: i32) {
        self.current_tile.lock().x = x;
    }

    /// Updates one axis of the current tile, leaving the other untouched.
    pub fn set_current_tile_y(&self, y: i32) {
        self.current_tile.lock().y = y;
    }

    /// Continuous position in centimetres.
    pub fn current_position(&self) -> ContinuousPosition {
        *self.current_position.lock()
    }

    /// Records the continuous position (cm).
    pub fn set_current_position(&self, position: ContinuousPosition) {
        *self.current_position.lock() = position;
    }

    /// Heading from the last position update.
    pub fn current_heading(&self) -> Heading {
        *self.current_heading.lock()
    }

    /// Records the heading from the position feed.
    pub fn set_current_heading(&self, heading: Heading) {
        *self.current_heading.lock() = heading;
    }

    /// Tile the active leg drives towards, `INVALID` when idle.
    pub fn target_tile(&self) -> TilePosition {
        *self.target_tile.lock()
    }

    /// Sets the tile the active leg drives towards.
    pub fn set_target_tile(&self, tile: TilePosition) {
        *self.target_tile.lock() = tile;
    }

    /// Resets the target tile to the invalid sentinel.
    pub fn invalidate_target_tile(&self) {
        *self.target_tile.lock() = TilePosition::INVALID;
    }

    /// Whether a target tile is set.
    pub fn is_target_tile_valid(&self) -> bool {
        !self.target_tile.lock().is_invalid()
    }

    /// Heading to turn to before driving, if a turn is pending.
    pub fn target_heading(&self) -> Option<Heading> {
        *self.target_heading.lock()
    }

    /// Sets or clears the pending turn heading.
    pub fn set_target_heading(&self, heading: Option<Heading>) {
        *self.target_heading.lock() = heading;
    }

    /// Clears the pending target heading.
    pub fn invalidate_target_heading(&self) {
        *self.target_heading.lock() = None;
    }

    fn range_slot(&self, side: SensorSide) -> &Mutex<RangeReading> {
        match side {
            SensorSide::Front => &self.front_range,
            SensorSide::Left => &self.left_range,
            SensorSide::Right => &self.right_range,
        }
    }

    fn fire_slot(&self, side: SensorSide) -> &Mutex<bool> {
        match side {
            SensorSide::Front => &self.front_fire,
            SensorSide::Left => &self.left_fire,
            SensorSide::Right => &self.right_fire,
        }
    }

    /// Latest reading of one range sensor.
    pub fn range(&self, side: SensorSide) -> RangeReading {
        *self.range_slot(side).lock()
    }

    /// Stores the latest reading of one range sensor.
    pub fn set_range(&self, side: SensorSide, reading: RangeReading) {
        *self.range_slot(side).lock() = reading;
    }

    /// Records that `side` has reported at least once.
    pub fn mark_range_received(&self, side: SensorSide) {
        let previous = self.ranges_received.fetch_or(side.bit(), Ordering::SeqCst);
        if previous & side.bit() == 0 {
            debug!("First {:?} range reading received", side);
        }
    }

    /// True once every range sensor has reported.
    pub fn all_ranges_received(&self) -> bool {
        self.ranges_received.load(Ordering::SeqCst) & ALL_RANGES == ALL_RANGES
    }

    /// Whether the flame sensor on `side` currently fires.
    pub fn fire(&self, side: SensorSide) -> bool {
        *self.fire_slot(side).lock()
    }

    /// Records one flame sensor output.
    pub fn set_fire(&self, side: SensorSide, detected: bool) {
        *self.fire_slot(side).lock() = detected;
    }

    /// Latest survivor classification.
    pub fn detection(&self) -> DetectionClass {
        *self.detection.lock()
    }

    /// Records the survivor classification.
    pub fn set_detection(&self, detection: DetectionClass) {
        *self.detection.lock() = detection;
    }

    /// Current mission phase.
    pub fn mission_state(&self) -> MissionState {
        *self.mission_state.lock()
    }

    /// Moves the mission to `state`.
    pub fn set_mission_state(&self, state: MissionState) {
        let mut current = self.mission_state.lock();
        if *current != state {
            info!("Mission state {:?} -> {:?}", *current, state);
        }
        *current = state;
    }

    /// Tile the mission started from, `INVALID` until recorded.
    pub fn home_tile(&self) -> TilePosition {
        *self.home_tile.lock()
    }

    /// Records the tile to return to.
    pub fn set_home_tile(&self, tile: TilePosition) {
        *self.home_tile.lock() = tile;
    }

    /// Tile where a flame was last located, `INVALID` if none.
    pub fn flame_tile(&self) -> TilePosition {
        *self.flame_tile.lock()
    }

    /// Records the flame tile.
    pub fn set_flame_tile(&self, tile: TilePosition) {
        *self.flame_tile.lock() = tile;
    }

    /// Queues a point of interest.
    ///
    /// Returns `false` for tiles off the grid and for tiles that were ever queued before,
    /// including ones already popped.
    pub fn push_point_of_interest(&self, tile: TilePosition) -> bool {
        if !self.grid.contains(tile) {
            debug!("Ignoring point of interest {} outside the grid", tile);
            return false;
        }
        let mut points = self.points_of_interest.lock();
        if points.history.contains(&tile) {
            return false;
        }
        let tile = TilePosition::new(tile.x, tile.y);
        points.history.push(tile);
        points.queue.push_back(tile);
        debug!("Point of interest {} queued", tile);
        true
    }

    /// Oldest unvisited point of interest.
    pub fn front_point_of_interest(&self) -> Option<TilePosition> {
        self.points_of_interest.lock().queue.front().copied()
    }

    /// Removes and returns the oldest unvisited point of interest.
    pub fn pop_point_of_interest(&self) -> Option<TilePosition> {
        self.points_of_interest.lock().queue.pop_front()
    }

    /// Number of unvisited points of interest.
    pub fn points_of_interest_len(&self) -> usize {
        self.points_of_interest.lock().queue.len()
    }

    /// Whether any point of interest is queued.
    pub fn has_points_of_interest(&self) -> bool {
        !self.points_of_interest.lock().queue.is_empty()
    }

    /// Every point of interest ever queued, in discovery order.
    pub fn point_of_interest_history(&self) -> Vec<TilePosition> {
        self.points_of_interest.lock().history.clone()
    }

    /// Records the most recently found point of interest as the flame tile when it lies on
    /// the current row, on the side the fire sensor reported.
    pub fn update_flame_tile_from_last_point(&self, side: Side) -> bool {
        let Some(last) = self.points_of_interest.lock().history.last().copied() else {
            return false;
        };
        let current = self.current_tile();
        let on_side = match side {
            Side::Left => last.x <= current.x,
            Side::Right => last.x >= current.x,
        };
        if last.y == current.y && on_side {
            info!("Flame located at {} ({} of {})", last, side, current);
            self.set_flame_tile(last);
            true
        } else {
            false
        }
    }

    /// Reads every field. Fields may come from different instants.
    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            current_tile: self.current_tile(),
            current_position: self.current_position(),
            current_heading: self.current_heading(),
            target_tile: self.target_tile(),
            target_heading: self.target_heading(),
            front: self.range(SensorSide::Front),
            left: self.range(SensorSide::Left),
            right: self.range(SensorSide::Right),
            fire: [
                self.fire(SensorSide::Front),
                self.fire(SensorSide::Left),
                self.fire(SensorSide::Right),
            ],
            detection: self.detection(),
            mission_state: self.mission_state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn store() -> SensorStore {
        SensorStore::new(GridGeometry::new(6, 0.3, 0.075))
    }

    #[rstest]
    fn starts_with_sentinels(store: SensorStore) {
        let snapshot = store.snapshot();
        assert!(snapshot.current_tile.is_invalid());
        assert!(snapshot.target_tile.is_invalid());
        assert_eq!(snapshot.current_heading, Heading::POS_Y);
        assert_eq!(snapshot.target_heading, None);
        assert_eq!(snapshot.front, RangeReading::NoData);
        assert!(!store.all_ranges_received());
    }

    #[rstest]
    fn axis_updates_are_independent(store: SensorStore) {
        store.set_current_tile(TilePosition::new(1, 1));
        store.set_current_tile_x(3);
        assert_eq!(store.current_tile(), TilePosition::new(3, 1));
        store.set_current_tile_y(4);
        assert_eq!(store.current_tile(), TilePosition::new(3, 4));
    }

    #[rstest]
    fn ranges_gate_opens_after_every_side(store: SensorStore) {
        store.mark_range_received(SensorSide::Front);
        store.mark_range_received(SensorSide::Left);
        assert!(!store.all_ranges_received());
        store.mark_range_received(SensorSide::Right);
        assert!(store.all_ranges_received());
    }

    #[rstest]
    fn popped_point_is_never_requeued(store: SensorStore) {
        assert!(store.push_point_of_interest(TilePosition::new(2, 2)));
        assert_eq!(store.pop_point_of_interest(), Some(TilePosition::new(2, 2)));
        assert!(!store.push_point_of_interest(TilePosition::new(2, 2)));
        assert!(!store.has_points_of_interest());
    }

    #[rstest]
    #[case(TilePosition::new(-1, 0))]
    #[case(TilePosition::new(6, 0))]
    #[case(TilePosition::INVALID)]
    fn off_grid_points_are_rejected(store: SensorStore, #[case] tile: TilePosition) {
        assert!(!store.push_point_of_interest(tile));
        assert_eq!(store.points_of_interest_len(), 0);
    }

    #[rstest]
    #[case(Side::Left, TilePosition::new(1, 3), true)]
    #[case(Side::Left, TilePosition::new(4, 3), false)]
    #[case(Side::Right, TilePosition::new(4, 3), true)]
    #[case(Side::Right, TilePosition::new(4, 2), false)]
    fn flame_tile_follows_side_and_row(
        store: SensorStore,
        #[case] side: Side,
        #[case] last_point: TilePosition,
        #[case] expected: bool,
    ) {
        store.set_current_tile(TilePosition::new(2, 3));
        store.push_point_of_interest(last_point);
        assert_eq!(store.update_flame_tile_from_last_point(side), expected);
        assert_eq!(store.flame_tile() == last_point, expected);
    }
}
