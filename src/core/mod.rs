// core/mod.rs

// Shared primitives for every tilebot component: grid and sensor types, the per-field
// sensor store, and the cancellation/wake-up plumbing the threads coordinate through.

/// Shared sensor store.
pub mod state;
/// Cancellation, wake-ups and timers.
pub mod sync;
/// Grid and sensor types.
pub mod types;

pub use state::{SensorSnapshot, SensorStore};
pub use sync::{CancelToken, Notifier, WaitOutcome, schedule_once};
pub use types::{
    Cardinal, ContinuousPosition, DetectionClass, GridGeometry, Heading, MissionState, RangeReading,
    SensorSide, Side, TilePosition, wrap_degrees,
};
