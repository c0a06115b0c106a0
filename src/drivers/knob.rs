//! Rotary knob with a push button and an RGB LED.

use log::debug;

use crate::device::{fire, Callback, Device, DeviceContext, Driver};
use crate::types::unit_to_byte;

const FUNCTION_GET_BUTTON: u8 = 0;
const FUNCTION_GET_POSITION: u8 = 1;
const FUNCTION_SET_COLOR: u8 = 3;

const EVENT_BUTTON_CHANGED: u8 = 0;
const EVENT_POSITION_CHANGED: u8 = 1;

/// Detent clicks per revolution.
const CLICKS_PER_TURN: i16 = 24;

/// Driver for `co.modulo.knob`.
#[derive(Default)]
pub struct Knob {
    button: bool,
    position: i16,
    on_press: Option<Callback<Knob>>,
    on_release: Option<Callback<Knob>>,
    on_position: Option<Callback<Knob>>,
}

impl Knob {
    pub const DEVICE_TYPE: &'static str = "co.modulo.knob";

    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the knob is pressed.
    pub fn button(&self) -> bool {
        self.button
    }

    /// Position in clicks, 24 per revolution.
    pub fn position(&self) -> i16 {
        self.position
    }

    /// Angle in degrees, in `[0, 360)`.
    pub fn angle(&self) -> f32 {
        f32::from(self.position.rem_euclid(CLICKS_PER_TURN)) * 360.0 / f32::from(CLICKS_PER_TURN)
    }

    pub fn on_press(&mut self, callback: impl FnMut(&mut Device<'_, Knob>) + 'static) -> &mut Self {
        self.on_press = Some(Box::new(callback));
        self
    }

    pub fn on_release(&mut self, callback: impl FnMut(&mut Device<'_, Knob>) + 'static) -> &mut Self {
        self.on_release = Some(Box::new(callback));
        self
    }

    pub fn on_position_change(
        &mut self,
        callback: impl FnMut(&mut Device<'_, Knob>) + 'static,
    ) -> &mut Self {
        self.on_position = Some(Box::new(callback));
        self
    }

    fn read_state(&mut self, ctx: &mut DeviceContext<'_>) {
        if let Some(reply) = ctx.transfer(FUNCTION_GET_POSITION, &[], 2) {
            self.position = i16::from_le_bytes([reply[0], reply[1]]);
        }
        if let Some(reply) = ctx.transfer(FUNCTION_GET_BUTTON, &[], 1) {
            self.button = reply[0] != 0;
        }
    }
}

impl Driver for Knob {
    fn device_type(&self) -> &'static str {
        Self::DEVICE_TYPE
    }

    fn on_event(&mut self, ctx: &mut DeviceContext<'_>, code: u8, data: u16) {
        match code {
            EVENT_BUTTON_CHANGED => {
                let pressed = data & 0x0100 != 0;
                let released = data & 0x0001 != 0;
                self.button = (self.button || pressed) && !released;
                if pressed {
                    fire(self, ctx, |knob| &mut knob.on_press);
                }
                if released {
                    fire(self, ctx, |knob| &mut knob.on_release);
                }
            }
            EVENT_POSITION_CHANGED => {
                self.position = data as i16;
                fire(self, ctx, |knob| &mut knob.on_position);
            }
            _ => debug!("Unknown knob event {}", code),
        }
    }

    fn on_resolved(&mut self, ctx: &mut DeviceContext<'_>) {
        self.read_state(ctx);
    }
}

impl Device<'_, Knob> {
    /// Set the LED color. Components are in `[0, 1]`.
    pub fn set_color(&mut self, red: f32, green: f32, blue: f32) {
        let color = [unit_to_byte(red), unit_to_byte(green), unit_to_byte(blue)];
        self.transfer(FUNCTION_SET_COLOR, &color, 0);
    }

    /// Set the LED color from hue, saturation and value, all in `[0, 1]`.
    pub fn set_hsv(&mut self, hue: f32, saturation: f32, value: f32) {
        let (red, green, blue) = hsv_to_rgb(hue, saturation, value);
        self.set_color(red, green, blue);
    }

    /// Read position and button state from the knob.
    pub fn refresh(&mut self) {
        if self.address().is_some() {
            let (ctx, knob) = self.split();
            knob.read_state(ctx);
        }
    }
}

pub(crate) fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> (f32, f32, f32) {
    if saturation <= 0.0 {
        return (value, value, value);
    }
    let h = hue.rem_euclid(1.0) * 6.0;
    let sector = h.floor();
    let f = h - sector;
    let p = value * (1.0 - saturation);
    let q = value * (1.0 - saturation * f);
    let t = value * (1.0 - saturation * (1.0 - f));
    match sector as u8 % 6 {
        0 => (value, t, p),
        1 => (q, value, p),
        2 => (p, value, t),
        3 => (p, q, value),
        4 => (t, p, value),
        _ => (value, p, q),
    }
}
