mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use approx::assert_relative_eq;
use common::{Recorder, fast_config, rig, rig_with_motors};
use tilebot::core::{Cardinal, Heading, TilePosition};
use tilebot::navigation::{
    ArrivalOutcome, CommandKind, MotorCommand, ObstacleResponse, RouteOutcome,
};
use tilebot::config::PlannerConfig;
use tilebot::core::Side;
use tilebot::MotorCommandSink;

fn tiles(coords: &[(i32, i32)]) -> Vec<TilePosition> {
    coords.iter().map(|&(x, y)| TilePosition::new(x, y)).collect()
}

#[test]
fn straight_route_turns_to_ninety_first() {
    let mut rig = rig(PlannerConfig::default());
    let outcome = rig
        .planner
        .drive_to_tile(TilePosition::new(0, 0), TilePosition::new(0, 5), 0.3, false);

    assert_eq!(
        outcome,
        RouteOutcome::Started { next: TilePosition::new(0, 1), heading: Heading::POS_Y }
    );
    let legs: Vec<_> = rig.planner.legs().iter().copied().collect();
    assert_eq!(legs, tiles(&[(0, 1), (0, 2), (0, 3), (0, 4), (0, 5)]));
    assert_eq!(rig.recorder.commands(), vec![MotorCommand::turn(Heading::new(90))]);
    assert_eq!(rig.store.target_tile(), TilePosition::new(0, 1));
    assert_eq!(rig.store.target_heading(), Some(Heading::POS_Y));
}

#[test]
fn drive_to_current_tile_is_a_no_op() {
    let mut rig = rig(PlannerConfig::default());
    rig.planner
        .drive_to_tile(TilePosition::new(0, 0), TilePosition::new(0, 2), 0.3, false);
    let legs_before: Vec<_> = rig.planner.legs().iter().copied().collect();
    rig.recorder.take_commands();

    let here = TilePosition::new(1, 1);
    assert_eq!(rig.planner.drive_to_tile(here, here, 0.3, true), RouteOutcome::AlreadyThere);
    assert!(rig.recorder.commands().is_empty());
    assert_eq!(rig.planner.legs().iter().copied().collect::<Vec<_>>(), legs_before);
}

#[test]
fn arrivals_advance_one_step_at_a_time() {
    let mut rig = rig(PlannerConfig::default());
    let start = TilePosition::new(0, 0);
    let dest = TilePosition::new(3, 2);
    rig.planner.drive_to_tile(start, dest, 0.25, false);

    let mut reached = start;
    loop {
        let front = rig.planner.legs()[0];
        match rig.planner.on_arrival_at_front(front) {
            ArrivalOutcome::Continue { next, heading } => {
                assert!(front.is_adjacent(next));
                assert_eq!(heading, Cardinal::between(front, next).heading());
                assert_eq!(rig.recorder.last_command(), Some(MotorCommand::turn(heading)));
                assert_eq!(rig.store.target_tile(), next);
            }
            ArrivalOutcome::Completed => {
                assert_eq!(front, dest);
                break;
            }
            other => panic!("unexpected arrival outcome {:?}", other),
        }
        assert!(reached.is_adjacent(front));
        reached = front;
    }

    assert_eq!(rig.recorder.last_command(), Some(MotorCommand::stop()));
    assert!(rig.store.target_tile().is_invalid());
    assert_eq!(rig.store.target_heading(), None);
    assert!(!rig.planner.has_route());
}

#[test]
fn unreachable_destination_stops_and_clears_targets() {
    let mut rig = rig(PlannerConfig::default());
    rig.planner.graph_mut().block_tile(TilePosition::new(5, 5));
    let outcome = rig
        .planner
        .drive_to_tile(TilePosition::new(0, 0), TilePosition::new(5, 5), 0.3, false);

    assert_eq!(outcome, RouteOutcome::Unreachable);
    assert_eq!(rig.recorder.commands(), vec![MotorCommand::stop()]);
    assert_eq!(rig.store.target_heading(), None);
    assert!(!rig.planner.is_moving());
}

#[test]
fn replan_routes_around_the_tile_ahead() {
    let mut rig = rig(PlannerConfig::default());
    let current = TilePosition::new(2, 2);
    let dest = TilePosition::new(5, 2);
    rig.planner.drive_to_tile(current, dest, 0.3, false);

    let outcome = rig
        .planner
        .on_obstacle_detected(current, Heading::POS_X, ObstacleResponse::Replan);

    let RouteOutcome::Started { next, heading } = outcome else {
        panic!("expected a new route, got {:?}", outcome);
    };
    assert!(next == TilePosition::new(2, 1) || next == TilePosition::new(2, 3));
    assert_eq!(rig.recorder.last_command(), Some(MotorCommand::turn(heading)));
    assert!(!rig.planner.legs().contains(&TilePosition::new(3, 2)));
    assert_eq!(rig.planner.final_destination(), Some(dest));

    // The block persists for later routes
    rig.planner.drive_to_tile(current, dest, 0.3, false);
    assert!(!rig.planner.legs().contains(&TilePosition::new(3, 2)));
    assert_eq!(rig.planner.legs().len(), 5);
}

#[test]
fn replan_keeps_scan_request_on_final_leg() {
    let mut rig = rig(PlannerConfig::default());
    let current = TilePosition::new(2, 2);
    rig.planner.drive_to_tile(current, TilePosition::new(5, 2), 0.3, true);
    rig.planner
        .on_obstacle_detected(current, Heading::new(10), ObstacleResponse::Replan);
    let last = rig.planner.legs().back().copied();
    assert!(last.is_some_and(|tile| tile.scan_on_reach));
}

#[test]
fn detour_side_steps_and_rejoins_route() {
    let mut rig = rig(PlannerConfig::default());
    let current = TilePosition::new(2, 2);
    rig.planner.drive_to_tile(current, TilePosition::new(5, 2), 0.3, false);

    let outcome = rig.planner.on_obstacle_detected(
        current,
        Heading::POS_X,
        ObstacleResponse::Detour(Side::Left),
    );

    assert_eq!(
        outcome,
        RouteOutcome::Started { next: TilePosition::new(2, 3), heading: Heading::POS_Y }
    );
    let legs: Vec<_> = rig.planner.legs().iter().copied().collect();
    assert_eq!(legs, tiles(&[(2, 3), (3, 3), (4, 3), (4, 2), (5, 2)]));
}

#[test]
fn detour_off_the_grid_falls_back_to_replan() {
    let mut rig = rig(PlannerConfig::default());
    let current = TilePosition::new(2, 5);
    let dest = TilePosition::new(5, 5);
    rig.planner.drive_to_tile(current, dest, 0.3, false);

    let outcome = rig.planner.on_obstacle_detected(
        current,
        Heading::POS_X,
        ObstacleResponse::Detour(Side::Left),
    );

    assert_eq!(
        outcome,
        RouteOutcome::Started { next: TilePosition::new(2, 4), heading: Heading::NEG_Y }
    );
    assert!(!rig.planner.legs().contains(&TilePosition::new(3, 5)));
    assert_eq!(rig.planner.final_destination(), Some(dest));
}

#[test]
fn detour_stops_at_destination_inside_bypass() {
    let mut rig = rig(PlannerConfig::default());
    let current = TilePosition::new(1, 1);
    rig.planner.drive_to_tile(current, TilePosition::new(3, 1), 0.3, true);

    rig.planner.on_obstacle_detected(
        current,
        Heading::POS_X,
        ObstacleResponse::Detour(Side::Right),
    );

    let legs: Vec<_> = rig.planner.legs().iter().copied().collect();
    assert_eq!(legs, tiles(&[(1, 0), (2, 0), (3, 0), (3, 1)]));
    assert!(legs[3].scan_on_reach);
}

#[test]
fn scan_window_crawls_then_stops_on_timer() {
    let config = fast_config();
    let mut rig = rig(config.clone());
    let dest = TilePosition::new(0, 1);
    rig.store.set_current_heading(Heading::POS_Y);
    rig.planner.drive_to_tile(TilePosition::new(0, 0), dest, 0.3, true);

    assert_eq!(rig.planner.on_arrival_at_front(dest), ArrivalOutcome::Scanning);
    let crawl = rig.recorder.last_command().expect("crawl command");
    assert_eq!(crawl.kind, CommandKind::Drive);
    assert_eq!(crawl.heading, Heading::POS_Y);
    assert_relative_eq!(crawl.speed, 0.3 * config.scan_speed_ratio);
    assert!(rig.status.is_scanning());
    assert!(rig.store.target_tile().is_invalid());

    let closed = rig
        .cancel
        .wait_until(|| !rig.status.is_scanning(), Some(Duration::from_secs(2)), config.wait_poll());
    assert!(closed.is_satisfied());
    assert_eq!(rig.recorder.last_command(), Some(MotorCommand::stop()));
    assert!(!rig.status.is_moving());
}

#[test]
fn new_route_disarms_pending_scan_timer() {
    let config = fast_config();
    let mut rig = rig(config);
    let dest = TilePosition::new(0, 1);
    rig.planner.drive_to_tile(TilePosition::new(0, 0), dest, 0.3, true);
    rig.planner.on_arrival_at_front(dest);

    rig.planner.drive_to_tile(dest, TilePosition::new(0, 3), 0.3, false);
    assert!(!rig.status.is_scanning());
    thread::sleep(Duration::from_millis(100));
    assert_eq!(rig.recorder.last_command(), Some(MotorCommand::turn(Heading::POS_Y)));
}

/// Holds every command sent from the scan timer thread for a while before recording it.
struct SlowTimerSink {
    recorder: Arc<Recorder>,
    entered: Arc<AtomicBool>,
}

impl MotorCommandSink for SlowTimerSink {
    fn send_command(&self, command: MotorCommand) {
        if thread::current().name() == Some("scan-timer") {
            self.entered.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
        }
        self.recorder.send_command(command);
    }
}

#[test]
fn expiring_timer_stop_lands_before_next_route() {
    let config = PlannerConfig { scan_duration_ms: 20, ..fast_config() };
    let entered = Arc::new(AtomicBool::new(false));
    let timer_entered = Arc::clone(&entered);
    let mut rig = rig_with_motors(config.clone(), move |recorder| {
        Arc::new(SlowTimerSink { recorder, entered: timer_entered }) as Arc<dyn MotorCommandSink>
    });
    let dest = TilePosition::new(0, 1);
    rig.store.set_current_heading(Heading::POS_Y);
    rig.planner.drive_to_tile(TilePosition::new(0, 0), dest, 0.3, true);
    assert_eq!(rig.planner.on_arrival_at_front(dest), ArrivalOutcome::Scanning);

    let inside = rig
        .cancel
        .wait_until(|| entered.load(Ordering::SeqCst), Some(Duration::from_secs(2)), config.wait_poll());
    assert!(inside.is_satisfied());
    rig.planner.drive_to_tile(dest, TilePosition::new(0, 3), 0.3, false);

    let kinds: Vec<_> = rig.recorder.commands().iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![CommandKind::Turn, CommandKind::Drive, CommandKind::Stop, CommandKind::Turn]
    );
    assert_eq!(rig.recorder.last_command(), Some(MotorCommand::turn(Heading::POS_Y)));
    assert_eq!(rig.store.target_heading(), Some(Heading::POS_Y));
    assert!(rig.status.is_moving());
    assert!(!rig.status.is_scanning());
}

#[test]
fn drive_speed_is_clamped() {
    let mut rig = rig(PlannerConfig::default());
    rig.planner.drive_to_tile(TilePosition::new(0, 0), TilePosition::new(0, 1), 5.0, false);
    assert_relative_eq!(rig.planner.drive_speed(), 0.3);
    rig.planner.publish_drive(Heading::POS_Y, 2.0);
    assert_relative_eq!(rig.recorder.last_command().map(|c| c.speed).unwrap_or_default(), 0.3);
}

#[test]
fn signal_complete_stops_then_pulses_indicator() {
    let mut rig = rig(fast_config());
    rig.planner.signal_complete();
    assert_eq!(rig.recorder.commands(), vec![MotorCommand::stop()]);
    assert_eq!(
        rig.recorder.pulses(),
        vec![(tilebot::Actuator::Indicator, true), (tilebot::Actuator::Indicator, false)]
    );
}

#[test]
fn cancelled_pulse_still_switches_off() {
    let mut rig = rig(PlannerConfig::default());
    rig.cancel.cancel();
    rig.planner.put_out_fire();
    assert_eq!(
        rig.recorder.pulses(),
        vec![(tilebot::Actuator::Fan, true), (tilebot::Actuator::Fan, false)]
    );
}
