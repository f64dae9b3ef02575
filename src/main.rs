// src/main.rs
// Demo entry point: runs the navigation core against the simulated plant and drives one
// route across the grid.

use clap::Parser;
use log::{info, warn};
use nalgebra::Point2;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tilebot::core::MissionState;
use tilebot::sim::DiffDrivePlant;
use tilebot::{Actuator, ActuatorSink, TileBot, TileBotConfig, TilePosition, WaitOutcome};

const SIM_STEP: Duration = Duration::from_millis(20);
const TRACK_WIDTH_M: f32 = 0.15;

/// Drive the simulated tilebot to a tile.
#[derive(Debug, Parser)]
#[command(name = "tilebot", version, about)]
struct Args {
    /// YAML parameter file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Start column.
    #[arg(long, default_value_t = 0)]
    start_x: i32,
    /// Start row.
    #[arg(long, default_value_t = 0)]
    start_y: i32,
    /// Destination column.
    #[arg(long, default_value_t = 5)]
    goal_x: i32,
    /// Destination row.
    #[arg(long, default_value_t = 5)]
    goal_y: i32,
    /// Cruise speed (m/s); the configured maximum when omitted.
    #[arg(long)]
    speed: Option<f32>,
    /// Crawl for a scan window on arrival.
    #[arg(long)]
    scan: bool,
    /// Drive back to the start tile afterwards.
    #[arg(long)]
    return_home: bool,
    /// Give up after this many seconds per route.
    #[arg(long, default_value_t = 60)]
    timeout_s: u64,
}

/// Logs actuator pulses instead of toggling hardware.
struct LoggedActuators;

impl ActuatorSink for LoggedActuators {
    fn set_actuator(&self, actuator: Actuator, on: bool) {
        info!("{:?} {}", actuator, if on { "on" } else { "off" });
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TileBotConfig::from_yaml_file(path)?,
        None => TileBotConfig::default(),
    };
    let tile_m = config.grid.tile_width_m;
    let speed = args.speed.unwrap_or(config.planner.max_drive_speed);
    let timeout = Some(Duration::from_secs(args.timeout_s));
    let start = TilePosition::new(args.start_x, args.start_y);
    let goal = TilePosition::new(args.goal_x, args.goal_y);

    let plant = DiffDrivePlant::new(
        Point2::new((start.x as f32 + 0.5) * tile_m, (start.y as f32 + 0.5) * tile_m),
        90.0,
        TRACK_WIDTH_M,
        &config.motor,
    );
    let start_cm = plant.position() * 100.0;

    let (bot, wheels) = TileBot::start(config, Arc::new(LoggedActuators))?;
    let start_tile = bot.store().grid().tile_from_cm(start_cm.x, start_cm.y);
    let Some(start) = start_tile else {
        bot.shutdown()?;
        return Err(format!("start tile {} is off the grid", start).into());
    };

    let feeds = bot.feeds();
    let plant_cancel = bot.cancel_token().clone();
    let sim = thread::Builder::new()
        .name("sim".into())
        .spawn(move || plant.run(feeds, wheels, plant_cancel, SIM_STEP))?;

    let nav = bot.nav_handle();
    let store = bot.store();
    if nav.wait_for_ranges(timeout) != WaitOutcome::Satisfied
        || nav.wait_until_at_tile(start, timeout) != WaitOutcome::Satisfied
    {
        warn!("Sensor feeds never came up");
    } else {
        store.set_home_tile(start);
        store.set_mission_state(MissionState::StartingCourse);
        info!("Driving {} -> {}", start, goal);

        let outcome = nav.drive_and_wait(goal, speed, args.scan, timeout)?;
        info!("Route finished ({:?}) at {}", outcome, store.current_tile());

        if args.return_home {
            if let Some(outcome) = nav.drive_home(speed, timeout)? {
                info!("Return home finished ({:?}) at {}", outcome, store.current_tile());
            }
        }
        store.set_mission_state(MissionState::Stopped);
    }

    bot.shutdown()?;
    if sim.join().is_err() {
        warn!("Simulated plant panicked");
    }
    Ok(())
}
