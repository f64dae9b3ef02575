// src/config.rs
// Tunable parameters for the planner, the motor mixer and the grid, loaded from YAML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::TileBotError;
use crate::navigation::ObstacleStrategy;

/// Top-level configuration for a tilebot process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TileBotConfig {
    /// Grid topology and position quantisation.
    pub grid: GridConfig,
    /// Waypoint execution.
    pub planner: PlannerConfig,
    /// PI heading mixer and turning.
    pub motor: MotorConfig,
}

/// Grid parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Tiles per side (`N`).
    pub size: i32,
    /// Tile edge length in metres.
    pub tile_width_m: f32,
    /// Distance from a tile centre inside which the robot counts as on that tile.
    pub position_accuracy_m: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            size: 6,
            tile_width_m: 0.3,
            position_accuracy_m: 0.075,
        }
    }
}

/// Planner and feed-loop parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// DRIVE commands are clamped to this speed (m/s).
    pub max_drive_speed: f32,
    /// Fraction of the commanded speed used while crawling through a scan window.
    pub scan_speed_ratio: f32,
    /// Length of the scan window.
    pub scan_duration_ms: u64,
    /// Turns count as complete inside this band (degrees).
    pub heading_tolerance_deg: f32,
    /// A confirmed forward reading below this is an obstacle (cm).
    pub obstacle_threshold_cm: f32,
    /// Side clearance required before taking a local detour (cm).
    pub detour_clearance_cm: f32,
    /// How the planner reacts to an obstacle.
    pub obstacle_strategy: ObstacleStrategy,
    /// How long fan and indicator pulses stay on.
    pub actuator_dwell_ms: u64,
    /// Upper bound on a single wait before predicates are re-checked.
    pub wait_poll_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            max_drive_speed: 0.3,
            scan_speed_ratio: 16.0 / 30.0,
            scan_duration_ms: 2000,
            heading_tolerance_deg: 3.0,
            obstacle_threshold_cm: 3.0,
            detour_clearance_cm: 30.0,
            obstacle_strategy: ObstacleStrategy::Replan,
            actuator_dwell_ms: 2000,
            wait_poll_ms: 10,
        }
    }
}

impl PlannerConfig {
    /// Scan window as a [`Duration`].
    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.scan_duration_ms)
    }

    /// Actuator dwell as a [`Duration`].
    pub fn actuator_dwell(&self) -> Duration {
        Duration::from_millis(self.actuator_dwell_ms)
    }

    /// Poll bound as a [`Duration`].
    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms.max(1))
    }
}

/// Motor mixer parameters.
///
/// The speed loop runs open-loop because the feed carries no measured speed;
/// `kp_speed` and `ki_speed` are still read so one parameter file serves every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Proportional heading gain (PWM per degree).
    pub kp_heading: f32,
    /// Integral heading gain.
    pub ki_heading: f32,
    /// Proportional speed gain.
    pub kp_speed: f32,
    /// Integral speed gain.
    pub ki_speed: f32,
    /// Anti-windup bound on the heading error integral.
    pub integral_clamp: f32,
    /// Full-scale PWM magnitude.
    pub pwm_range: f32,
    /// Speed (m/s) that maps to full-scale PWM.
    pub max_velocity: f32,
    /// PWM magnitude used for in-place turns.
    pub turning_speed: f32,
    /// Integration step of the heading loop (s).
    pub control_period_s: f32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        MotorConfig {
            kp_heading: 1.0,
            ki_heading: 0.1,
            kp_speed: 0.0,
            ki_speed: 0.0,
            integral_clamp: 2.0,
            pwm_range: 100.0,
            max_velocity: 0.4,
            turning_speed: 30.0,
            control_period_s: 0.1,
        }
    }
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A value that must be strictly positive.
    #[error("`{field}` must be positive, got {value}")]
    NotPositive {
        /// Dotted parameter name.
        field: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A gain or speed below zero.
    #[error("`{field}` must not be negative, got {value}")]
    Negative {
        /// Dotted parameter name.
        field: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A ratio outside `(0, 1]`.
    #[error("`{field}` must lie in (0, 1], got {value}")]
    OutOfUnitRange {
        /// Dotted parameter name.
        field: &'static str,
        /// Offending value.
        value: f64,
    },

    /// Turning PWM above what the motors accept.
    #[error("turning speed {turning} exceeds pwm range {range}")]
    TurningSpeedTooHigh {
        /// Configured turning PWM.
        turning: f32,
        /// Configured PWM limit.
        range: f32,
    },
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

impl TileBotConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TileBotError> {
        let config: TileBotConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, TileBotError> {
        let path = path.as_ref();
        log::info!("Loading configuration from {}", path.display());
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Checks every value the control code divides by or clamps against.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let grid = &self.grid;
        positive("grid.size", grid.size as f64)?;
        positive("grid.tile_width_m", grid.tile_width_m as f64)?;
        positive("grid.position_accuracy_m", grid.position_accuracy_m as f64)?;

        let planner = &self.planner;
        positive("planner.max_drive_speed", planner.max_drive_speed as f64)?;
        if !(planner.scan_speed_ratio > 0.0 && planner.scan_speed_ratio <= 1.0) {
            return Err(ConfigError::OutOfUnitRange {
                field: "planner.scan_speed_ratio",
                value: planner.scan_speed_ratio as f64,
            });
        }
        positive("planner.heading_tolerance_deg", planner.heading_tolerance_deg as f64)?;
        non_negative("planner.obstacle_threshold_cm", planner.obstacle_threshold_cm as f64)?;
        non_negative("planner.detour_clearance_cm", planner.detour_clearance_cm as f64)?;

        let motor = &self.motor;
        non_negative("motor.kp_heading", motor.kp_heading as f64)?;
        non_negative("motor.ki_heading", motor.ki_heading as f64)?;
        non_negative("motor.kp_speed", motor.kp_speed as f64)?;
        non_negative("motor.ki_speed", motor.ki_speed as f64)?;
        positive("motor.integral_clamp", motor.integral_clamp as f64)?;
        positive("motor.pwm_range", motor.pwm_range as f64)?;
        positive("motor.max_velocity", motor.max_velocity as f64)?;
        positive("motor.control_period_s", motor.control_period_s as f64)?;
        non_negative("motor.turning_speed", motor.turning_speed as f64)?;
        if motor.turning_speed > motor.pwm_range {
            return Err(ConfigError::TurningSpeedTooHigh {
                turning: motor.turning_speed,
                range: motor.pwm_range,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(TileBotConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = TileBotConfig::from_yaml_str(
            "grid:\n  size: 7\nplanner:\n  obstacle_strategy: detour\n",
        )
        .unwrap();
        assert_eq!(config.grid.size, 7);
        assert_eq!(config.grid.tile_width_m, 0.3);
        assert_eq!(config.planner.obstacle_strategy, ObstacleStrategy::Detour);
        assert_eq!(config.motor, MotorConfig::default());
    }

    #[test]
    fn rejects_zero_grid() {
        let mut config = TileBotConfig::default();
        config.grid.size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive { field: "grid.size", .. })
        ));
    }

    #[test]
    fn rejects_turning_faster_than_pwm_range() {
        let mut config = TileBotConfig::default();
        config.motor.turning_speed = 150.0;
        assert!(matches!(config.validate(), Err(ConfigError::TurningSpeedTooHigh { .. })));
    }
}
