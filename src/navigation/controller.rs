// src/navigation/controller.rs
// Turns motor commands plus the live heading into signed wheel PWM values.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::bus::{BusError, Publisher, Subscriber};
use crate::config::MotorConfig;
use crate::core::sync::CancelToken;
use crate::core::types::Heading;
use crate::navigation::{CommandKind, MotorCommand, MotorInput};

const INPUT_POLL: Duration = Duration::from_millis(50);

/// Signed PWM per wheel. The sign selects direction, the magnitude the duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelPwm {
    /// Left wheel PWM.
    pub left: f32,
    /// Right wheel PWM.
    pub right: f32,
}

impl WheelPwm {
    /// Both wheels off.
    pub const STOPPED: WheelPwm = WheelPwm { left: 0.0, right: 0.0 };

    /// Whether both wheels are off.
    pub fn is_stopped(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }

    /// Scales both sides by the same factor so the larger magnitude is at most `limit`.
    pub fn saturate(self, limit: f32) -> WheelPwm {
        let dominant = self.left.abs().max(self.right.abs());
        if dominant > limit {
            let scale = limit / dominant;
            WheelPwm {
                left: self.left * scale,
                right: self.right * scale,
            }
        } else {
            self
        }
    }
}

/// PI heading mixer. Holds the heading error integral between updates.
#[derive(Debug, Clone)]
pub struct DriveController {
    config: MotorConfig,
    error_sum: f32,
}

impl DriveController {
    /// Controller with an empty integral.
    pub fn new(config: MotorConfig) -> Self {
        DriveController { config, error_sum: 0.0 }
    }

    /// Accumulated heading error (degree-seconds).
    pub fn integral(&self) -> f32 {
        self.error_sum
    }

    /// Clears the heading integral.
    pub fn reset(&mut self) {
        self.error_sum = 0.0;
    }

    /// One control step towards `commanded` at `speed` (m/s) from `current`.
    pub fn update(&mut self, commanded: Heading, speed: f32, current: Heading) -> WheelPwm {
        let config = &self.config;
        let error = current.error_to(commanded) as f32;

        // Anti-windup: skip the step that would reach the clamp
        let step = error * config.control_period_s;
        if (self.error_sum + step).abs() < config.integral_clamp {
            self.error_sum += step;
        }

        let correction = error * config.kp_heading + self.error_sum * config.ki_heading;
        let speed = speed.clamp(-config.max_velocity, config.max_velocity);
        let base = speed / config.max_velocity * config.pwm_range;

        WheelPwm {
            left: base - correction,
            right: base + correction,
        }
        .saturate(config.pwm_range)
    }
}

/// Direction of an in-place rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Negative about the vertical axis.
    Clockwise,
    /// Positive about the vertical axis.
    CounterClockwise,
}

/// Bang-bang in-place rotation at a fixed PWM magnitude.
#[derive(Debug, Clone, Copy)]
pub struct TurnController {
    speed: f32,
}

impl TurnController {
    /// Controller turning at `speed` PWM.
    pub fn new(speed: f32) -> Self {
        TurnController { speed }
    }

    /// Shorter way round from `current` to `desired`. Errors in `[0, 180]` turn
    /// counter-clockwise.
    pub fn rotation(desired: Heading, current: Heading) -> Rotation {
        if (0..=180).contains(&current.error_to(desired)) {
            Rotation::CounterClockwise
        } else {
            Rotation::Clockwise
        }
    }

    /// Wheel outputs turning from `current` towards `desired`.
    pub fn command(&self, desired: Heading, current: Heading) -> WheelPwm {
        match Self::rotation(desired, current) {
            Rotation::CounterClockwise => WheelPwm {
                left: -self.speed,
                right: self.speed,
            },
            Rotation::Clockwise => WheelPwm {
                left: self.speed,
                right: -self.speed,
            },
        }
    }
}

/// Whether `current` lies strictly inside `tolerance_deg` of `desired`.
pub fn is_aligned(desired: Heading, current: Heading, tolerance_deg: f32) -> bool {
    (current.error_to(desired).abs() as f32) < tolerance_deg
}

/// Motor-command consumer. Starts each command with the last known heading and
/// continues it on every heading update.
#[derive(Debug)]
pub struct MotorDriver {
    drive: DriveController,
    turn: TurnController,
    last_command: MotorCommand,
    last_heading: Heading,
}

impl MotorDriver {
    /// Stopped driver.
    pub fn new(config: MotorConfig) -> Self {
        MotorDriver {
            turn: TurnController::new(config.turning_speed),
            drive: DriveController::new(config),
            last_command: MotorCommand::stop(),
            last_heading: Heading::default(),
        }
    }

    /// Command currently being executed.
    pub fn last_command(&self) -> MotorCommand {
        self.last_command
    }

    /// Heading loop state.
    pub fn drive_controller(&self) -> &DriveController {
        &self.drive
    }

    /// Switches to `command` and returns the wheel output for it.
    pub fn on_command(&mut self, command: MotorCommand) -> WheelPwm {
        debug!("Motor command {:?}", command);
        if command.kind != CommandKind::Drive {
            self.drive.reset();
        }
        self.last_command = command;
        self.output()
    }

    /// Continues the current command. Nothing to send while stopped.
    pub fn on_heading(&mut self, heading: Heading) -> Option<WheelPwm> {
        self.last_heading = heading;
        self.last_command.is_moving().then(|| self.output())
    }

    /// Applies one input. `None` when the wheels should keep their output.
    pub fn handle(&mut self, input: MotorInput) -> Option<WheelPwm> {
        match input {
            MotorInput::Command(command) => Some(self.on_command(command)),
            MotorInput::Heading(heading) => self.on_heading(heading),
        }
    }

    fn output(&mut self) -> WheelPwm {
        let command = self.last_command;
        match command.kind {
            CommandKind::Stop => WheelPwm::STOPPED,
            CommandKind::Turn => self.turn.command(command.heading, self.last_heading),
            CommandKind::Drive => self.drive.update(command.heading, command.speed, self.last_heading),
        }
    }

    /// Consumes inputs until cancelled or the input topic closes.
    pub fn run(
        mut self,
        inputs: Subscriber<MotorInput>,
        wheels: Publisher<WheelPwm>,
        cancel: CancelToken,
    ) -> Result<(), BusError> {
        info!("Motor driver listening on `{}`", inputs.topic());
        while !cancel.is_cancelled() {
            let input = match inputs.recv_timeout(INPUT_POLL) {
                Ok(Some(input)) => input,
                Ok(None) => continue,
                Err(err) => {
                    info!("Motor driver stopping: {}", err);
                    break;
                }
            };
            if let Some(pwm) = self.handle(input) {
                if let Err(err) = wheels.publish(pwm) {
                    warn!("Wheel output lost: {}", err);
                    return Err(err);
                }
            }
        }
        // Leave the wheels stopped on the way out
        let _ = wheels.publish(WheelPwm::STOPPED);
        Ok(())
    }
}
