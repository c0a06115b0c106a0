//! Dual H-bridge motor driver: two DC motors, one stepper, or four raw channels.

use log::debug;

use crate::device::{fire, Callback, Device, DeviceContext, Driver};

const FUNCTION_SET_VALUE: u8 = 0;
const FUNCTION_SET_ENABLED: u8 = 1;
const FUNCTION_SET_FREQUENCY: u8 = 2;
const FUNCTION_SET_CURRENT_LIMIT: u8 = 3;
const FUNCTION_SET_STEPPER_SPEED: u8 = 4;
const FUNCTION_GET_STEPPER_POSITION: u8 = 5;
const FUNCTION_SET_STEPPER_TARGET: u8 = 6;

const EVENT_POSITION_REACHED: u8 = 0;
const EVENT_FAULT_CHANGED: u8 = 1;

const MAX_MICROSTEPS: u16 = 256;

/// Output mode of the driver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum MotorMode {
    Disabled = 0,
    Dc = 1,
    Stepper = 2,
}

/// Driver for `co.modulo.motor`.
pub struct MotorDriver {
    fault: bool,
    us_per_step: u32,
    microsteps: u16,
    min_microstep_duration: u32,
    on_position_reached: Option<Callback<MotorDriver>>,
    on_fault_changed: Option<Callback<MotorDriver>>,
}

impl Default for MotorDriver {
    fn default() -> Self {
        Self {
            fault: false,
            us_per_step: 5000,
            microsteps: MAX_MICROSTEPS,
            min_microstep_duration: 1000,
            on_position_reached: None,
            on_fault_changed: None,
        }
    }
}

impl MotorDriver {
    pub const DEVICE_TYPE: &'static str = "co.modulo.motor";

    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a short, over-current or over-temperature shutdown is active.
    pub fn has_fault(&self) -> bool {
        self.fault
    }

    /// Called when the stepper reaches its target position.
    pub fn on_position_reached(
        &mut self,
        callback: impl FnMut(&mut Device<'_, MotorDriver>) + 'static,
    ) -> &mut Self {
        self.on_position_reached = Some(Box::new(callback));
        self
    }

    pub fn on_fault_changed(
        &mut self,
        callback: impl FnMut(&mut Device<'_, MotorDriver>) + 'static,
    ) -> &mut Self {
        self.on_fault_changed = Some(Box::new(callback));
        self
    }

    /// Payload of the set-stepper-speed command for the current settings.
    ///
    /// The microstep count is halved until a microstep lasts at least the
    /// minimum duration, and sent as its base 2 logarithm.
    fn stepper_speed(&self) -> [u8; 3] {
        let mut microsteps = u32::from(self.microsteps.clamp(1, MAX_MICROSTEPS));
        while microsteps > 1 && self.us_per_step / microsteps < self.min_microstep_duration {
            microsteps /= 2;
        }
        let resolution = (31 - microsteps.leading_zeros()) as u8;
        let [lo, hi] = (self.us_per_step.min(u32::from(u16::MAX)) as u16).to_le_bytes();
        [lo, hi, resolution]
    }
}

impl Driver for MotorDriver {
    fn device_type(&self) -> &'static str {
        Self::DEVICE_TYPE
    }

    fn on_event(&mut self, ctx: &mut DeviceContext<'_>, code: u8, data: u16) {
        match code {
            EVENT_POSITION_REACHED => fire(self, ctx, |motor| &mut motor.on_position_reached),
            EVENT_FAULT_CHANGED => {
                if data & 1 != 0 {
                    self.fault = true;
                    fire(self, ctx, |motor| &mut motor.on_fault_changed);
                }
                if data & 2 != 0 {
                    self.fault = false;
                    fire(self, ctx, |motor| &mut motor.on_fault_changed);
                }
            }
            _ => debug!("Unknown motor driver event {}", code),
        }
    }
}

impl Device<'_, MotorDriver> {
    /// Set one of the four channels (0 to 3) to a duty cycle in `[0, 1]`.
    /// Switches the driver to DC mode.
    pub fn set_channel(&mut self, channel: u8, amount: f32) {
        let value = (amount.clamp(0.0, 1.0) * f32::from(u16::MAX)) as u16;
        let [lo, hi] = value.to_le_bytes();
        self.transfer(FUNCTION_SET_VALUE, &[channel, lo, hi], 0);
    }

    /// Drive motor A at a speed in `[-1, 1]`.
    pub fn set_motor_a(&mut self, value: f32) {
        self.set_motor(0, value);
    }

    /// Drive motor B at a speed in `[-1, 1]`.
    pub fn set_motor_b(&mut self, value: f32) {
        self.set_motor(2, value);
    }

    fn set_motor(&mut self, channel: u8, value: f32) {
        let value = value.clamp(-1.0, 1.0);
        if value > 0.0 {
            self.set_channel(channel, 1.0);
            self.set_channel(channel + 1, 1.0 - value);
        } else {
            self.set_channel(channel, 1.0 + value);
            self.set_channel(channel + 1, 1.0);
        }
    }

    pub fn set_mode(&mut self, mode: MotorMode) {
        self.transfer(FUNCTION_SET_ENABLED, &[mode as u8], 0);
    }

    /// Set the current limit as a fraction in `[0, 1]` of the maximum.
    pub fn set_current_limit(&mut self, limit: f32) {
        let limit = (limit.clamp(0.0, 1.0) * 63.0) as u8;
        self.transfer(FUNCTION_SET_CURRENT_LIMIT, &[limit], 0);
    }

    pub fn set_pwm_frequency(&mut self, frequency: u16) {
        self.transfer(FUNCTION_SET_FREQUENCY, &frequency.to_le_bytes(), 0);
    }

    /// Set the stepper speed in whole steps per second.
    pub fn set_stepper_speed(&mut self, steps_per_second: f32) {
        self.set_stepper_rate((1e6 / steps_per_second) as u32);
    }

    /// Set the time between whole steps in microseconds.
    pub fn set_stepper_rate(&mut self, us_per_step: u32) {
        self.us_per_step = us_per_step;
        self.update_stepper_speed();
    }

    /// Set the microsteps per whole step (a power of two up to 256). Fewer
    /// microsteps are used if one would be shorter than
    /// `min_microstep_duration` microseconds.
    pub fn set_stepper_resolution(&mut self, microsteps: u16, min_microstep_duration: u32) {
        self.microsteps = microsteps;
        self.min_microstep_duration = min_microstep_duration;
        self.update_stepper_speed();
    }

    fn update_stepper_speed(&mut self) {
        let speed = self.stepper_speed();
        self.transfer(FUNCTION_SET_STEPPER_SPEED, &speed, 0);
    }

    /// Move the stepper to `target`, in 1/256 of a whole step.
    pub fn set_stepper_target(&mut self, target: i32) {
        self.transfer(FUNCTION_SET_STEPPER_TARGET, &target.to_le_bytes(), 0);
    }

    /// Stepper position in 1/256 of a whole step.
    pub fn stepper_position(&mut self) -> Option<i32> {
        let reply = self.transfer(FUNCTION_GET_STEPPER_POSITION, &[], 4)?;
        Some(i32::from_le_bytes([reply[0], reply[1], reply[2], reply[3]]))
    }
}
