// src/sim.rs
// Ideal differential-drive plant for running the stack without hardware. Wheel PWM maps
// linearly to wheel speed; there is no slip, inertia or sensor noise.

use log::{debug, info, warn};
use nalgebra::{Point2, Vector2};
use std::time::Duration;

use crate::bus::{PositionMsg, Subscriber};
use crate::config::MotorConfig;
use crate::core::sync::CancelToken;
use crate::core::types::SensorSide;
use crate::navigation::WheelPwm;
use crate::SensorFeed;

/// Range every simulated sensor reports (cm).
pub const CLEAR_RANGE_CM: f32 = 200.0;

/// Kinematic robot: position in metres, heading in degrees counter-clockwise from +X.
#[derive(Debug, Clone)]
pub struct DiffDrivePlant {
    position: Point2<f32>,
    heading_deg: f32,
    track_width_m: f32,
    pwm_range: f32,
    max_velocity: f32,
}

impl DiffDrivePlant {
    /// Plant at `position` (m) facing `heading_deg`.
    pub fn new(position: Point2<f32>, heading_deg: f32, track_width_m: f32, motor: &MotorConfig) -> Self {
        DiffDrivePlant {
            position,
            heading_deg,
            track_width_m,
            pwm_range: motor.pwm_range,
            max_velocity: motor.max_velocity,
        }
    }

    /// Position in metres.
    pub fn position(&self) -> Point2<f32> {
        self.position
    }

    /// Heading in degrees.
    pub fn heading_deg(&self) -> f32 {
        self.heading_deg
    }

    fn wheel_speed(&self, pwm: f32) -> f32 {
        pwm / self.pwm_range * self.max_velocity
    }

    /// Advances the plant by `dt` seconds under constant wheel PWM.
    pub fn step(&mut self, wheels: WheelPwm, dt: f32) {
        let left = self.wheel_speed(wheels.left);
        let right = self.wheel_speed(wheels.right);
        let linear = (left + right) / 2.0;
        let angular = (right - left) / self.track_width_m;

        let theta = self.heading_deg.to_radians();
        self.position += Vector2::new(theta.cos(), theta.sin()) * linear * dt;
        self.heading_deg = (self.heading_deg + angular.to_degrees() * dt).rem_euclid(360.0);
    }

    /// Pose as the position feed would report it.
    pub fn position_msg(&self) -> PositionMsg {
        PositionMsg {
            x: self.position.x,
            y: self.position.y,
            heading: self.heading_deg.round() as i32,
        }
    }

    /// Steps in real time, applying the newest wheel output and publishing the pose each
    /// step, until cancelled or the feed closes.
    pub fn run(mut self, feeds: SensorFeed, wheels: Subscriber<WheelPwm>, cancel: CancelToken, step: Duration) {
        info!("Simulated plant running at {:?} steps", step);
        let mut output = WheelPwm::STOPPED;
        let mut ticks: u64 = 0;
        loop {
            if let Some(latest) = wheels.latest() {
                output = latest;
            }
            self.step(output, step.as_secs_f32());

            if let Err(err) = feeds.publish_position(self.position_msg()) {
                warn!("Plant stopping: {}", err);
                return;
            }
            if ticks % 10 == 0 {
                for side in [SensorSide::Front, SensorSide::Left, SensorSide::Right] {
                    if feeds.publish_range(side, CLEAR_RANGE_CM).is_err() {
                        return;
                    }
                }
                debug!("Plant at ({:.3}, {:.3}) {:.1}°", self.position.x, self.position.y, self.heading_deg);
            }
            ticks += 1;
            if !cancel.sleep(step) {
                return;
            }
        }
    }
}
