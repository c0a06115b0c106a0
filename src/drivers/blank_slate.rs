//! General purpose I/O board with eight pins.

use log::debug;

use crate::device::{Device, DeviceContext, Driver};

const FUNCTION_GET_DIGITAL_INPUT: u8 = 0;
const FUNCTION_GET_DIGITAL_INPUTS: u8 = 1;
const FUNCTION_GET_ANALOG_INPUT: u8 = 2;
const FUNCTION_SET_DATA_DIRECTION: u8 = 3;
const FUNCTION_SET_DATA_DIRECTIONS: u8 = 4;
const FUNCTION_SET_DIGITAL_OUTPUT: u8 = 5;
const FUNCTION_SET_DIGITAL_OUTPUTS: u8 = 6;
const FUNCTION_SET_PWM_OUTPUT: u8 = 7;
const FUNCTION_SET_PULLUP: u8 = 8;
const FUNCTION_SET_PULLUPS: u8 = 9;
const FUNCTION_SET_PWM_FREQUENCY: u8 = 10;

/// Full scale of the analog inputs.
const ANALOG_MAX: f32 = 1023.0;

/// Driver for `co.modulo.blankslate`.
#[derive(Debug, Default)]
pub struct BlankSlate;

impl BlankSlate {
    pub const DEVICE_TYPE: &'static str = "co.modulo.blankslate";

    pub fn new() -> Self {
        Self
    }
}

impl Driver for BlankSlate {
    fn device_type(&self) -> &'static str {
        Self::DEVICE_TYPE
    }

    fn on_event(&mut self, _ctx: &mut DeviceContext<'_>, code: u8, _data: u16) {
        debug!("Unknown blank slate event {}", code);
    }
}

impl Device<'_, BlankSlate> {
    /// Disable the output on `pin` and read it.
    pub fn digital_input(&mut self, pin: u8) -> Option<bool> {
        let reply = self.transfer(FUNCTION_GET_DIGITAL_INPUT, &[pin], 1)?;
        Some(reply[0] != 0)
    }

    /// Read all eight pins, one per bit, without changing their directions.
    pub fn digital_inputs(&mut self) -> Option<u8> {
        let reply = self.transfer(FUNCTION_GET_DIGITAL_INPUTS, &[], 1)?;
        Some(reply[0])
    }

    /// Disable the output on `pin` and read its voltage as a fraction in `[0, 1]`.
    pub fn analog_input(&mut self, pin: u8) -> Option<f32> {
        let reply = self.transfer(FUNCTION_GET_ANALOG_INPUT, &[pin, 0], 2)?;
        Some(f32::from(u16::from_le_bytes([reply[0], reply[1]])) / ANALOG_MAX)
    }

    pub fn set_direction(&mut self, pin: u8, output: bool) {
        self.transfer(FUNCTION_SET_DATA_DIRECTION, &[pin, output.into()], 0);
    }

    /// Set the direction of all eight pins, one per bit. A set bit is an output.
    pub fn set_directions(&mut self, outputs: u8) {
        self.transfer(FUNCTION_SET_DATA_DIRECTIONS, &[outputs], 0);
    }

    /// Enable the output on `pin` and drive it.
    pub fn set_digital_output(&mut self, pin: u8, value: bool) {
        self.transfer(FUNCTION_SET_DIGITAL_OUTPUT, &[pin, value.into()], 0);
    }

    /// Set the output value of all eight pins without enabling or disabling outputs.
    pub fn set_digital_outputs(&mut self, values: u8) {
        self.transfer(FUNCTION_SET_DIGITAL_OUTPUTS, &[values], 0);
    }

    /// Enable the output on `pin` with a PWM duty cycle in `[0, 1]`.
    ///
    /// Pins 0 to 4 have hardware PWM, the others use software PWM with more jitter.
    pub fn set_pwm_value(&mut self, pin: u8, value: f32) {
        if value >= 1.0 {
            return self.set_digital_output(pin, true);
        }
        if value <= 0.0 {
            return self.set_digital_output(pin, false);
        }
        let [lo, hi] = ((value * f32::from(u16::MAX)) as u16).to_le_bytes();
        self.transfer(FUNCTION_SET_PWM_OUTPUT, &[pin, lo, hi], 0);
    }

    pub fn set_pullup(&mut self, pin: u8, enable: bool) {
        self.transfer(FUNCTION_SET_PULLUP, &[pin, enable.into()], 0);
    }

    pub fn set_pullups(&mut self, values: u8) {
        self.transfer(FUNCTION_SET_PULLUPS, &[values], 0);
    }

    pub fn set_pwm_frequency(&mut self, pin: u8, frequency: u16) {
        let [lo, hi] = frequency.to_le_bytes();
        self.transfer(FUNCTION_SET_PWM_FREQUENCY, &[pin, lo, hi], 0);
    }
}
