mod common;

use nalgebra::Point2;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::Recorder;
use tilebot::core::{MissionState, SensorSide};
use tilebot::sim::DiffDrivePlant;
use tilebot::{Heading, NavRequest, TileBot, TileBotConfig, TilePosition, WaitOutcome};

const STEP: Duration = Duration::from_millis(10);
const TIMEOUT: Option<Duration> = Some(Duration::from_secs(20));

fn config() -> TileBotConfig {
    let mut config = TileBotConfig::default();
    config.planner.wait_poll_ms = 5;
    config.planner.actuator_dwell_ms = 5;
    config
}

fn start_with_plant(config: TileBotConfig) -> (TileBot, thread::JoinHandle<()>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let plant = DiffDrivePlant::new(Point2::new(0.15, 0.15), 90.0, 0.15, &config.motor);
    let (bot, wheels) = TileBot::start(config, Arc::new(Recorder::default())).unwrap();
    let feeds = bot.feeds();
    let cancel = bot.cancel_token().clone();
    let sim = thread::spawn(move || plant.run(feeds, wheels, cancel, STEP));
    (bot, sim)
}

#[test]
fn invalid_config_is_rejected_before_threads_start() {
    let mut config = TileBotConfig::default();
    config.motor.pwm_range = 0.0;
    assert!(TileBot::start(config, Arc::new(Recorder::default())).is_err());
}

#[test]
fn drives_to_tile_on_simulated_plant() {
    let (bot, sim) = start_with_plant(config());
    let nav = bot.nav_handle();

    assert_eq!(nav.wait_for_ranges(TIMEOUT), WaitOutcome::Satisfied);
    assert_eq!(nav.wait_until_at_tile(TilePosition::new(0, 0), TIMEOUT), WaitOutcome::Satisfied);
    bot.store().set_home_tile(TilePosition::new(0, 0));

    let outcome = nav.drive_and_wait(TilePosition::new(0, 2), 0.3, false, TIMEOUT).unwrap();
    assert_eq!(outcome, WaitOutcome::Satisfied);
    assert_eq!(bot.store().current_tile(), TilePosition::new(0, 2));

    let turned = nav.turn_and_wait(Heading::POS_X, TIMEOUT).unwrap();
    assert_eq!(turned, WaitOutcome::Satisfied);

    let home = nav.drive_home(0.3, TIMEOUT).unwrap();
    assert_eq!(home, Some(WaitOutcome::Satisfied));
    assert_eq!(bot.store().current_tile(), TilePosition::new(0, 0));
    assert_eq!(bot.store().mission_state(), MissionState::ReturnHome);

    bot.shutdown().unwrap();
    sim.join().unwrap();
}

#[test]
fn requests_are_acknowledged_by_feed_thread() {
    let (bot, wheels) = TileBot::start(config(), Arc::new(Recorder::default())).unwrap();
    let nav = bot.nav_handle();
    let outcome = nav.request_and_ack(NavRequest::Stop, TIMEOUT).unwrap();
    assert_eq!(outcome, WaitOutcome::Satisfied);
    assert_eq!(nav.status().requests_handled(), 1);
    drop(wheels);
    bot.shutdown().unwrap();
}

#[test]
fn shutdown_cancels_pending_waits() {
    let (bot, _wheels) = TileBot::start(config(), Arc::new(Recorder::default())).unwrap();
    let nav = bot.nav_handle();
    let waiter = thread::spawn(move || nav.wait_for_ranges(None));
    let feeds = bot.feeds();
    feeds.publish_range(SensorSide::Front, 10.0).unwrap();
    thread::sleep(Duration::from_millis(20));
    bot.shutdown().unwrap();
    assert_eq!(waiter.join().unwrap(), WaitOutcome::Cancelled);
}

#[test]
fn drive_home_without_home_tile_is_skipped() {
    let (bot, _wheels) = TileBot::start(config(), Arc::new(Recorder::default())).unwrap();
    assert_eq!(bot.nav_handle().drive_home(0.3, TIMEOUT).unwrap(), None);
    bot.shutdown().unwrap();
}
