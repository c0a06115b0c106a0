//! Two-axis joystick with a push button.

use log::debug;

use crate::device::{fire, Callback, Device, DeviceContext, Driver};

const FUNCTION_GET_BUTTON: u8 = 0;
const FUNCTION_GET_POSITION: u8 = 1;

const EVENT_BUTTON_CHANGED: u8 = 0;
const EVENT_POSITION_CHANGED: u8 = 1;

/// Raw reading of a centered axis.
const CENTER: u8 = 128;

/// Driver for `co.modulo.joystick`.
pub struct Joystick {
    button: bool,
    h_raw: u8,
    v_raw: u8,
    on_press: Option<Callback<Joystick>>,
    on_release: Option<Callback<Joystick>>,
    on_position: Option<Callback<Joystick>>,
}

impl Default for Joystick {
    fn default() -> Self {
        Self {
            button: false,
            h_raw: CENTER,
            v_raw: CENTER,
            on_press: None,
            on_release: None,
            on_position: None,
        }
    }
}

impl Joystick {
    pub const DEVICE_TYPE: &'static str = "co.modulo.joystick";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn button(&self) -> bool {
        self.button
    }

    /// Horizontal position in `[-1, 1]`.
    pub fn h_position(&self) -> f32 {
        axis(self.h_raw)
    }

    /// Vertical position in `[-1, 1]`.
    pub fn v_position(&self) -> f32 {
        axis(self.v_raw)
    }

    /// Raw `(horizontal, vertical)` readings, 128 when centered.
    pub fn raw_position(&self) -> (u8, u8) {
        (self.h_raw, self.v_raw)
    }

    pub fn on_press(
        &mut self,
        callback: impl FnMut(&mut Device<'_, Joystick>) + 'static,
    ) -> &mut Self {
        self.on_press = Some(Box::new(callback));
        self
    }

    pub fn on_release(
        &mut self,
        callback: impl FnMut(&mut Device<'_, Joystick>) + 'static,
    ) -> &mut Self {
        self.on_release = Some(Box::new(callback));
        self
    }

    pub fn on_position_change(
        &mut self,
        callback: impl FnMut(&mut Device<'_, Joystick>) + 'static,
    ) -> &mut Self {
        self.on_position = Some(Box::new(callback));
        self
    }

    fn read_state(&mut self, ctx: &mut DeviceContext<'_>) {
        if let Some(reply) = ctx.transfer(FUNCTION_GET_BUTTON, &[], 1) {
            self.button = reply[0] != 0;
        }
        if let Some(reply) = ctx.transfer(FUNCTION_GET_POSITION, &[], 2) {
            self.h_raw = reply[0];
            self.v_raw = reply[1];
        }
    }
}

fn axis(raw: u8) -> f32 {
    1.0 - f32::from(raw) * 2.0 / 255.0
}

impl Driver for Joystick {
    fn device_type(&self) -> &'static str {
        Self::DEVICE_TYPE
    }

    fn on_event(&mut self, ctx: &mut DeviceContext<'_>, code: u8, data: u16) {
        let [lo, hi] = data.to_le_bytes();
        match code {
            EVENT_BUTTON_CHANGED => {
                let pressed = hi != 0;
                let released = lo != 0;
                self.button = (self.button || pressed) && !released;
                if pressed {
                    fire(self, ctx, |joystick| &mut joystick.on_press);
                }
                if released {
                    fire(self, ctx, |joystick| &mut joystick.on_release);
                }
            }
            EVENT_POSITION_CHANGED => {
                self.h_raw = hi;
                self.v_raw = lo;
                fire(self, ctx, |joystick| &mut joystick.on_position);
            }
            _ => debug!("Unknown joystick event {}", code),
        }
    }

    fn on_resolved(&mut self, ctx: &mut DeviceContext<'_>) {
        self.read_state(ctx);
    }
}

impl Device<'_, Joystick> {
    /// Read button and position from the joystick.
    pub fn refresh(&mut self) {
        if self.address().is_some() {
            let (ctx, joystick) = self.split();
            joystick.read_state(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis() {
        assert_eq!(axis(0), 1.0);
        assert_eq!(axis(255), -1.0);
        assert!(axis(CENTER).abs() < 0.01);
        let joystick = Joystick::new();
        assert_eq!(joystick.raw_position(), (128, 128));
        assert!(!joystick.button());
    }
}
