// core/types.rs

//! Grid, heading and sensor primitives shared by every tilebot component.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::config::GridConfig;

/// Continuous position in centimetres, derived from the metre-scale pose feed.
pub type ContinuousPosition = Point2<f32>;

/// Wraps an angle difference in degrees into `(-180, 180]`.
pub fn wrap_degrees(degrees: i32) -> i32 {
    let wrapped = degrees.rem_euclid(360);
    if wrapped > 180 { wrapped - 360 } else { wrapped }
}

/// A tile on the `N x N` grid.
///
/// Equality and hashing only look at the coordinates; `scan_on_reach` is routing
/// metadata carried by the last leg of a route.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TilePosition {
    /// Column, growing along +X.
    pub x: i32,
    /// Row, growing along +Y.
    pub y: i32,
    /// Crawl forward for a scan window once this tile is reached as the final leg.
    #[serde(default)]
    pub scan_on_reach: bool,
}

impl TilePosition {
    /// Sentinel for an unset or invalidated tile.
    pub const INVALID: TilePosition = TilePosition { x: -1, y: -1, scan_on_reach: false };

    /// Creates a tile without the scan flag.
    pub const fn new(x: i32, y: i32) -> Self {
        TilePosition { x, y, scan_on_reach: false }
    }

    /// Creates a tile that requests a scan window on arrival.
    pub const fn with_scan(x: i32, y: i32) -> Self {
        TilePosition { x, y, scan_on_reach: true }
    }

    /// True for the `(-1, -1)` sentinel.
    pub fn is_invalid(&self) -> bool {
        *self == Self::INVALID
    }

    /// Tile `steps` tiles away in `direction`. The scan flag is not carried over.
    pub fn offset(self, direction: Cardinal, steps: i32) -> TilePosition {
        let (dx, dy) = direction.delta();
        TilePosition::new(self.x + dx * steps, self.y + dy * steps)
    }

    /// Grid (Manhattan) distance between two tiles.
    pub fn manhattan(self, other: TilePosition) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// True when the tiles share an edge on the grid.
    pub fn is_adjacent(self, other: TilePosition) -> bool {
        self.manhattan(other) == 1
    }
}

impl Default for TilePosition {
    fn default() -> Self {
        Self::INVALID
    }
}

impl PartialEq for TilePosition {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl Eq for TilePosition {}

impl Hash for TilePosition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.hash(state);
        self.y.hash(state);
    }
}

impl fmt::Display for TilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Integer heading in degrees, normalised to `[0, 360)`.
///
/// 0/90/180/270 point along +X/+Y/-X/-Y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub struct Heading(i32);

impl Heading {
    /// Facing +X.
    pub const POS_X: Heading = Heading(0);
    /// Facing +Y. Robots start the course facing this way.
    pub const POS_Y: Heading = Heading(90);
    /// Facing -X.
    pub const NEG_X: Heading = Heading(180);
    /// Facing -Y.
    pub const NEG_Y: Heading = Heading(270);

    /// Normalises any integer angle into `[0, 360)`.
    pub fn new(degrees: i32) -> Self {
        Heading(degrees.rem_euclid(360))
    }

    /// Degrees in `[0, 360)`.
    pub fn degrees(self) -> i32 {
        self.0
    }

    /// Signed error in degrees from `self` to `target`, wrapped into `(-180, 180]`.
    /// Positive means `target` lies counter-clockwise of `self`.
    pub fn error_to(self, target: Heading) -> i32 {
        wrap_degrees(target.0 - self.0)
    }

    /// Quantises to the cardinal direction of the octant the heading falls in.
    pub fn cardinal(self) -> Cardinal {
        Cardinal::from_heading(self)
    }
}

impl Default for Heading {
    fn default() -> Self {
        Heading::POS_Y
    }
}

impl From<i32> for Heading {
    fn from(degrees: i32) -> Self {
        Heading::new(degrees)
    }
}

impl From<Heading> for i32 {
    fn from(heading: Heading) -> Self {
        heading.0
    }
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.0)
    }
}

/// Grid axis directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinal {
    /// +X, heading 0.
    PosX,
    /// +Y, heading 90.
    PosY,
    /// -X, heading 180.
    NegX,
    /// -Y, heading 270.
    NegY,
}

impl Cardinal {
    /// `[0,90) -> +X, [90,180) -> +Y, [180,270) -> -X, else -Y`.
    pub fn from_heading(heading: Heading) -> Self {
        match heading.degrees() {
            0..=89 => Cardinal::PosX,
            90..=179 => Cardinal::PosY,
            180..=269 => Cardinal::NegX,
            _ => Cardinal::NegY,
        }
    }

    /// Direction of the leg `from -> to`.
    ///
    /// Legs are always axis aligned: an unchanged `x` means the leg runs along Y.
    pub fn between(from: TilePosition, to: TilePosition) -> Self {
        if from.x == to.x {
            if from.y > to.y { Cardinal::NegY } else { Cardinal::PosY }
        } else if from.x > to.x {
            Cardinal::NegX
        } else {
            Cardinal::PosX
        }
    }

    /// Exact heading of this direction.
    pub fn heading(self) -> Heading {
        match self {
            Cardinal::PosX => Heading::POS_X,
            Cardinal::PosY => Heading::POS_Y,
            Cardinal::NegX => Heading::NEG_X,
            Cardinal::NegY => Heading::NEG_Y,
        }
    }

    /// Unit tile offset `(dx, dy)`.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Cardinal::PosX => (1, 0),
            Cardinal::PosY => (0, 1),
            Cardinal::NegX => (-1, 0),
            Cardinal::NegY => (0, -1),
        }
    }

    /// The direction pointing the other way.
    pub fn opposite(self) -> Self {
        match self {
            Cardinal::PosX => Cardinal::NegX,
            Cardinal::PosY => Cardinal::NegY,
            Cardinal::NegX => Cardinal::PosX,
            Cardinal::NegY => Cardinal::PosY,
        }
    }

    /// Quarter turn towards `side`. Left is counter-clockwise.
    pub fn rotated(self, side: Side) -> Self {
        match (side, self) {
            (Side::Left, Cardinal::PosX) => Cardinal::PosY,
            (Side::Left, Cardinal::PosY) => Cardinal::NegX,
            (Side::Left, Cardinal::NegX) => Cardinal::NegY,
            (Side::Left, Cardinal::NegY) => Cardinal::PosX,
            (Side::Right, direction) => direction.rotated(Side::Left).opposite(),
        }
    }
}

/// Lateral side relative to the robot's heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Counter-clockwise of the heading.
    Left,
    /// Clockwise of the heading.
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Mounting direction of a range or fire sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSide {
    /// Looking along the heading.
    Front,
    /// Looking left.
    Left,
    /// Looking right.
    Right,
}

impl SensorSide {
    /// Bit used when tracking which feeds have reported.
    pub(crate) fn bit(self) -> u8 {
        match self {
            SensorSide::Front => 0x01,
            SensorSide::Left => 0x02,
            SensorSide::Right => 0x04,
        }
    }

    /// Lateral side for the left/right sensors.
    pub fn lateral(self) -> Option<Side> {
        match self {
            SensorSide::Front => None,
            SensorSide::Left => Some(Side::Left),
            SensorSide::Right => Some(Side::Right),
        }
    }
}

/// A range sensor reading.
///
/// Unknown readings never compare as near or as clear.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum RangeReading {
    /// Nothing received yet.
    #[default]
    NoData,
    /// The sensor never saw its echo.
    Timeout,
    /// Measured distance in centimetres.
    Cm(f32),
}

impl RangeReading {
    /// Converts a raw feed value: NaN is a timeout, negative values are the start sentinel.
    pub fn from_raw(distance_cm: f32) -> Self {
        if distance_cm.is_nan() {
            RangeReading::Timeout
        } else if distance_cm < 0.0 {
            RangeReading::NoData
        } else {
            RangeReading::Cm(distance_cm)
        }
    }

    /// Distance when one was measured.
    pub fn distance_cm(self) -> Option<f32> {
        match self {
            RangeReading::Cm(distance) => Some(distance),
            _ => None,
        }
    }

    /// Whether the reading carries a distance.
    pub fn is_known(self) -> bool {
        self.distance_cm().is_some()
    }

    /// Something confirmed closer than `threshold_cm`.
    pub fn is_within(self, threshold_cm: f32) -> bool {
        matches!(self, RangeReading::Cm(distance) if distance < threshold_cm)
    }

    /// Confirmed free space of at least `clearance_cm`.
    pub fn is_clear_beyond(self, clearance_cm: f32) -> bool {
        matches!(self, RangeReading::Cm(distance) if distance >= clearance_cm)
    }
}

/// What a scan found at the current location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DetectionClass {
    /// Nothing detected.
    #[default]
    None,
    /// Single survivor or small building (`0x02`).
    Single,
    /// Multiple survivors or large building (`0x03`).
    Multiple,
}

impl DetectionClass {
    /// Two-bit wire encoding.
    pub fn bits(self) -> u8 {
        match self {
            DetectionClass::None => 0x00,
            DetectionClass::Single => 0x02,
            DetectionClass::Multiple => 0x03,
        }
    }

    /// Decodes the two-bit classification. Unassigned codes read as nothing detected.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0x02 => DetectionClass::Single,
            0x03 => DetectionClass::Multiple,
            _ => DetectionClass::None,
        }
    }

    /// Anything other than [`DetectionClass::None`].
    pub fn is_detected(self) -> bool {
        self != DetectionClass::None
    }
}

/// Mission phase, written by the mission sequencer and read by everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MissionState {
    /// Waiting for the sensor feeds.
    #[default]
    Idle,
    /// Feeds are up, leaving the start tile.
    StartingCourse,
    /// Looking for a tile to start the search from.
    FindingSearchTile,
    /// Sweeping for points of interest.
    InitialSearch,
    /// Locating the flame.
    FlameSearch,
    /// Locating the hall magnet.
    HallSearch,
    /// Visiting candidate buildings.
    BuildingSearch,
    /// Driving back to the home tile.
    ReturnHome,
    /// Mission finished or aborted.
    Stopped,
}

/// Grid dimensions and the mapping from metres/centimetres to tiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    size: i32,
    tile_width_m: f32,
    position_accuracy_m: f32,
}

impl GridGeometry {
    /// Builds the geometry from validated grid parameters.
    pub fn new(size: i32, tile_width_m: f32, position_accuracy_m: f32) -> Self {
        GridGeometry { size, tile_width_m, position_accuracy_m }
    }

    /// Tiles per side.
    pub fn size(&self) -> i32 {
        self.size
    }

    /// Tile edge length in metres.
    pub fn tile_width_m(&self) -> f32 {
        self.tile_width_m
    }

    /// Whether the tile lies on the grid.
    pub fn contains(&self, tile: TilePosition) -> bool {
        (0..self.size).contains(&tile.x) && (0..self.size).contains(&tile.y)
    }

    /// Node index `y * N + x`.
    pub fn index(&self, tile: TilePosition) -> Option<usize> {
        self.contains(tile).then(|| (tile.y * self.size + tile.x) as usize)
    }

    /// Inverse of [`GridGeometry::index`].
    pub fn tile_at(&self, index: usize) -> Option<TilePosition> {
        let size = self.size as usize;
        (index < size * size).then(|| TilePosition::new((index % size) as i32, (index / size) as i32))
    }

    /// Tile containing a point given in centimetres, if it lies on the grid.
    pub fn tile_from_cm(&self, x_cm: f32, y_cm: f32) -> Option<TilePosition> {
        let tile_cm = self.tile_width_m * 100.0;
        if x_cm < 0.0 || y_cm < 0.0 {
            return None;
        }
        let tile = TilePosition::new((x_cm / tile_cm) as i32, (y_cm / tile_cm) as i32);
        self.contains(tile).then_some(tile)
    }

    /// Tile index along one axis, reported only while the coordinate sits within the
    /// accuracy band around that tile's centre.
    pub fn quantize_axis(&self, coordinate_m: f32) -> Option<i32> {
        if !coordinate_m.is_finite() || coordinate_m < 0.0 {
            return None;
        }
        let tile_coordinate = coordinate_m / self.tile_width_m;
        let whole = tile_coordinate.trunc();
        let coverage = tile_coordinate.fract();
        let centred = (0.5 - coverage.abs()).abs() < self.position_accuracy_m / self.tile_width_m;
        let index = whole as i32;
        (centred && (0..self.size).contains(&index)).then_some(index)
    }
}

impl From<&GridConfig> for GridGeometry {
    fn from(config: &GridConfig) -> Self {
        GridGeometry::new(config.size, config.tile_width_m, config.position_accuracy_m)
    }
}
