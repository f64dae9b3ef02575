use std::sync::Arc;
use std::thread;

use tilebot::core::{GridGeometry, Heading, RangeReading, SensorSide, SensorStore, TilePosition};

fn store() -> Arc<SensorStore> {
    Arc::new(SensorStore::new(GridGeometry::new(6, 0.3, 0.075)))
}

#[test]
fn concurrent_writers_never_tear_a_field() {
    let store = store();
    let writers: Vec<_> = (0..4)
        .map(|n| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..2_000 {
                    let v = (i + n) % 6;
                    store.set_current_tile(TilePosition::new(v, v));
                    store.set_current_heading(Heading::new(v * 90));
                    store.set_range(SensorSide::Front, RangeReading::Cm(v as f32));
                }
            })
        })
        .collect();

    for _ in 0..2_000 {
        let snapshot = store.snapshot();
        assert_eq!(snapshot.current_tile.x, snapshot.current_tile.y);
        assert_eq!(snapshot.current_heading.degrees() % 90, 0);
    }
    for writer in writers {
        writer.join().unwrap();
    }
}

#[test]
fn points_of_interest_are_fifo_and_deduplicated() {
    let store = store();
    for (x, y) in [(1, 1), (2, 3), (1, 1), (4, 0), (2, 3)] {
        store.push_point_of_interest(TilePosition::new(x, y));
    }
    assert_eq!(store.points_of_interest_len(), 3);
    assert_eq!(store.front_point_of_interest(), Some(TilePosition::new(1, 1)));
    assert_eq!(store.pop_point_of_interest(), Some(TilePosition::new(1, 1)));
    assert_eq!(store.pop_point_of_interest(), Some(TilePosition::new(2, 3)));
    assert!(!store.push_point_of_interest(TilePosition::new(1, 1)));
    assert_eq!(store.point_of_interest_history().len(), 3);
}

#[test]
fn scan_flag_is_not_stored_with_points() {
    let store = store();
    store.push_point_of_interest(TilePosition::with_scan(3, 3));
    assert!(!store.pop_point_of_interest().is_some_and(|tile| tile.scan_on_reach));
}

#[test]
fn target_tile_validity() {
    let store = store();
    assert!(!store.is_target_tile_valid());
    store.set_target_tile(TilePosition::new(0, 1));
    assert!(store.is_target_tile_valid());
    store.invalidate_target_tile();
    assert!(!store.is_target_tile_valid());
}
