//! 96x64 color OLED display with three buttons.
//!
//! Drawing calls are queued on the display as ops. The display has a small
//! op queue; before every op the driver makes sure the queue reported enough
//! free space for it, polling the display while it is full. Consecutive
//! [`write`](Device::write) calls are coalesced into one string op, which is
//! sent when another drawing call is made, on [`flush`](Device::flush), or
//! when it fills the op buffer.

use std::fmt;
use std::thread;
use std::time::Duration;

use arrayvec::ArrayVec;
use log::{debug, trace, warn};

use crate::device::{Device, DeviceContext, Driver};
use crate::error::Result;
use crate::types::{coord_byte, unit_to_byte, InvalidButtonSnafu};

const FUNCTION_APPEND_OP: u8 = 0;
const FUNCTION_IS_COMPLETE: u8 = 1;
const FUNCTION_GET_BUTTONS: u8 = 2;
const FUNCTION_IS_EMPTY: u8 = 4;
const FUNCTION_GET_AVAILABLE_SPACE: u8 = 5;
const FUNCTION_SET_CURRENT: u8 = 6;
const FUNCTION_SET_CONTRAST: u8 = 7;

const EVENT_BUTTON_CHANGED: u8 = 0;

const OP_REFRESH: u8 = 0;
const OP_FILL_SCREEN: u8 = 1;
const OP_DRAW_LINE: u8 = 2;
const OP_SET_LINE_COLOR: u8 = 3;
const OP_SET_FILL_COLOR: u8 = 4;
const OP_SET_TEXT_COLOR: u8 = 5;
const OP_DRAW_RECT: u8 = 6;
const OP_DRAW_CIRCLE: u8 = 7;
const OP_DRAW_TRIANGLE: u8 = 8;
const OP_DRAW_STRING: u8 = 9;
const OP_SET_CURSOR: u8 = 10;
const OP_SET_TEXT_SIZE: u8 = 11;
const OP_CLEAR: u8 = 12;

/// Largest op the display accepts, including the op code.
pub const OP_BUFFER_SIZE: usize = 28;

pub const BUTTON_COUNT: u8 = 3;

/// Left clip edge for rectangles. Not 0, so rounded corners stay round.
const CLIP_LEFT: i32 = -128;

/// A button callback, invoked with the display and the button index.
pub type ButtonCallback = Box<dyn FnMut(&mut Device<'_, Display>, u8)>;

/// Driver for `co.modulo.display`.
pub struct Display {
    /// The string op being accumulated. Empty when no op is in progress.
    op: ArrayVec<u8, OP_BUFFER_SIZE>,
    available_space: u16,
    refreshing: bool,
    button_state: u8,
    poll_interval: Duration,
    on_button_press: Option<ButtonCallback>,
    on_button_release: Option<ButtonCallback>,
}

impl Default for Display {
    fn default() -> Self {
        Self {
            op: ArrayVec::new(),
            available_space: 0,
            refreshing: false,
            button_state: 0,
            poll_interval: Duration::from_millis(5),
            on_button_press: None,
            on_button_release: None,
        }
    }
}

impl Display {
    pub const DEVICE_TYPE: &'static str = "co.modulo.display";
    pub const WIDTH: i32 = 96;
    pub const HEIGHT: i32 = 64;

    pub fn new() -> Self {
        Self::default()
    }

    /// How long to sleep between polls while waiting on the display.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Button state as last reported by events, one bit per button.
    pub fn pressed_buttons(&self) -> u8 {
        self.button_state
    }

    /// Whether a refresh was queued and hasn't been waited for.
    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    pub fn on_button_press(
        &mut self,
        callback: impl FnMut(&mut Device<'_, Display>, u8) + 'static,
    ) -> &mut Self {
        self.on_button_press = Some(Box::new(callback));
        self
    }

    pub fn on_button_release(
        &mut self,
        callback: impl FnMut(&mut Device<'_, Display>, u8) + 'static,
    ) -> &mut Self {
        self.on_button_release = Some(Box::new(callback));
        self
    }

    fn fire_button(
        &mut self,
        ctx: &mut DeviceContext<'_>,
        button: u8,
        select: impl Fn(&mut Self) -> &mut Option<ButtonCallback>,
    ) {
        if let Some(mut callback) = select(self).take() {
            callback(&mut Device::new(ctx.reborrow(), &mut *self), button);
            let slot = select(self);
            if slot.is_none() {
                *slot = Some(callback);
            }
        }
    }
}

impl Driver for Display {
    fn device_type(&self) -> &'static str {
        Self::DEVICE_TYPE
    }

    fn on_event(&mut self, ctx: &mut DeviceContext<'_>, code: u8, data: u16) {
        if code != EVENT_BUTTON_CHANGED {
            debug!("Unknown display event {}", code);
            return;
        }
        let [released, pressed] = data.to_le_bytes();
        self.button_state |= pressed;
        self.button_state &= !released;
        for button in 0..BUTTON_COUNT {
            if pressed & (1 << button) != 0 {
                self.fire_button(ctx, button, |display| &mut display.on_button_press);
            }
            if released & (1 << button) != 0 {
                self.fire_button(ctx, button, |display| &mut display.on_button_release);
            }
        }
    }

    fn reset(&mut self) {
        self.op.clear();
        self.available_space = 0;
        self.refreshing = false;
    }
}

impl Device<'_, Display> {
    /// Queue `op`, waiting until the display has room for it.
    fn send_op(&mut self, op: &[u8]) {
        let len = op.len() as u16;
        while self.available_space < len {
            match self.transfer(FUNCTION_GET_AVAILABLE_SPACE, &[], 2) {
                Some(reply) => self.available_space = u16::from_le_bytes([reply[0], reply[1]]),
                None => {
                    warn!("Display didn't report its queue space, dropping op {}", op[0]);
                    return;
                }
            }
            if self.available_space < len {
                trace!("Display queue full, {} bytes free", self.available_space);
                thread::sleep(self.poll_interval);
            }
        }
        self.available_space -= len;
        self.transfer(FUNCTION_APPEND_OP, op, 0);
    }

    /// Send the string op in progress, if any.
    fn end_op(&mut self) {
        if self.op.is_empty() {
            return;
        }
        let mut op = std::mem::take(&mut self.op);
        op.push(0);
        self.send_op(&op);
    }

    /// Block until a queued refresh has been drawn.
    fn wait_on_refresh(&mut self) {
        if !self.refreshing {
            return;
        }
        self.refreshing = false;
        while self.is_empty() == Some(false) {
            thread::sleep(self.poll_interval);
        }
    }

    /// Finish pending text and wait for a refresh, then queue `op`.
    fn draw(&mut self, op: &[u8]) {
        self.end_op();
        self.wait_on_refresh();
        self.send_op(op);
    }

    /// Fill the screen with black, reset the colors to white and the cursor to (0, 0).
    pub fn clear(&mut self) {
        self.draw(&[OP_CLEAR]);
    }

    pub fn set_line_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.draw(&color_op(OP_SET_LINE_COLOR, red, green, blue, alpha));
    }

    pub fn set_fill_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.draw(&color_op(OP_SET_FILL_COLOR, red, green, blue, alpha));
    }

    pub fn set_text_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.draw(&color_op(OP_SET_TEXT_COLOR, red, green, blue, alpha));
    }

    /// Where the next text is drawn.
    pub fn set_cursor(&mut self, x: i32, y: i32) {
        self.draw(&[OP_SET_CURSOR, coord_byte(x), coord_byte(y)]);
    }

    /// Show everything drawn so far. The next drawing call waits until
    /// the frame is on screen.
    pub fn refresh(&mut self, flip: bool) {
        self.draw(&[OP_REFRESH, flip.into()]);
        self.refreshing = true;
    }

    pub fn fill_screen(&mut self, red: f32, green: f32, blue: f32) {
        self.draw(&color_op(OP_FILL_SCREEN, red, green, blue, 1.0));
    }

    /// Draw a line. Coordinates are clamped to `[-128, 127]`.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) {
        self.draw(&[
            OP_DRAW_LINE,
            coord_byte(x0),
            coord_byte(y0),
            coord_byte(x1),
            coord_byte(y1),
        ]);
    }

    /// Draw a rectangle with its upper left corner at `(x, y)`.
    pub fn draw_rect(&mut self, x: i32, y: i32, width: i32, height: i32, radius: u8) {
        let (x, width) = clip_range(x, width, Display::WIDTH);
        let (y, height) = clip_range(y, height, Display::HEIGHT);
        self.draw(&[OP_DRAW_RECT, x, y, width, height, radius]);
    }

    pub fn draw_circle(&mut self, x: i32, y: i32, radius: u8) {
        self.draw(&[OP_DRAW_CIRCLE, coord_byte(x), coord_byte(y), radius]);
    }

    pub fn draw_triangle(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, x2: i32, y2: i32) {
        self.draw(&[
            OP_DRAW_TRIANGLE,
            coord_byte(x0),
            coord_byte(y0),
            coord_byte(x1),
            coord_byte(y1),
            coord_byte(x2),
            coord_byte(y2),
        ]);
    }

    /// Text size as a multiple of the 8 pixel base font.
    pub fn set_text_size(&mut self, size: u8) {
        self.draw(&[OP_SET_TEXT_SIZE, size]);
    }

    /// Draw `text` at the cursor. Characters outside of Latin-1 are drawn as `?`.
    pub fn write(&mut self, text: &str) {
        self.wait_on_refresh();
        for c in text.chars() {
            let byte = u8::try_from(c).unwrap_or(b'?');
            if byte == 0 {
                continue;
            }
            if self.op.is_empty() {
                self.op.push(OP_DRAW_STRING);
            }
            self.op.push(byte);
            if self.op.len() == OP_BUFFER_SIZE - 1 {
                self.end_op();
            }
        }
    }

    /// Send any text written since the last drawing call.
    pub fn flush(&mut self) {
        self.end_op();
    }

    /// Whether every queued op has been executed.
    pub fn is_complete(&mut self) -> Option<bool> {
        let reply = self.transfer(FUNCTION_IS_COMPLETE, &[], 1)?;
        Some(reply[0] != 0)
    }

    /// Whether the op queue is empty. A refresh may still be in progress.
    pub fn is_empty(&mut self) -> Option<bool> {
        let reply = self.transfer(FUNCTION_IS_EMPTY, &[], 1)?;
        Some(reply[0] != 0)
    }

    /// State of all buttons, one per bit.
    pub fn buttons(&mut self) -> Option<u8> {
        let reply = self.transfer(FUNCTION_GET_BUTTONS, &[], 1)?;
        Some(reply[0])
    }

    /// Whether `button` is pressed. `false` if the display didn't answer.
    /// # Errors
    /// Returns [`Error::Type`](crate::Error::Type) with an invalid button
    /// error unless `button < 3`.
    pub fn button(&mut self, button: u8) -> Result<bool> {
        if button >= BUTTON_COUNT {
            return Err(InvalidButtonSnafu { button }.build().into());
        }
        Ok(self.buttons().map_or(false, |b| b & (1 << button) != 0))
    }

    /// Set the master current in `[0, 1]`. Higher values are brighter but
    /// increase burn-in. Waits until all queued ops have been executed.
    pub fn set_current(&mut self, current: f32) {
        let current = (current.clamp(0.0, 1.0) * 15.0) as u8;
        self.wait_complete();
        self.transfer(FUNCTION_SET_CURRENT, &[current], 0);
    }

    /// Set the per channel contrast in `[0, 1]`. Waits until all queued ops
    /// have been executed.
    pub fn set_contrast(&mut self, red: f32, green: f32, blue: f32) {
        let contrast = [unit_to_byte(red), unit_to_byte(green), unit_to_byte(blue)];
        self.wait_complete();
        self.transfer(FUNCTION_SET_CONTRAST, &contrast, 0);
    }

    fn wait_complete(&mut self) {
        while self.is_complete() == Some(false) {
            thread::sleep(self.poll_interval);
        }
    }

    /// Draw the Modulo logo and name on a purple background.
    pub fn draw_splash_screen(&mut self) {
        self.set_fill_color(0.27, 0.0, 0.24, 1.0);
        self.set_line_color(0.0, 0.0, 0.0, 0.0);
        self.draw_rect(0, 0, Display::WIDTH, Display::HEIGHT, 0);
        self.set_cursor(0, 40);
        self.set_text_color(1.0, 1.0, 1.0, 1.0);
        self.write("     MODULO");
        self.set_fill_color(1.0, 1.0, 1.0, 1.0);
        self.draw_logo(Display::WIDTH / 2 - 18, 10, 35, 26);
    }

    /// Draw the Modulo logo with the fill color.
    pub fn draw_logo(&mut self, x: i32, y: i32, width: i32, height: i32) {
        let line = width / 7;
        self.draw_rect(x, y, width, line, 0);
        self.draw_rect(x, y, line, height, 0);
        self.draw_rect(x + width - line, y, line, height, 0);
        self.draw_rect(x + line * 2, y + line * 2, line, height - line * 2, 0);
        self.draw_rect(x + line * 4, y + line * 2, line, height - line * 2, 0);
        self.draw_rect(x + line * 2, y + height - line, line * 3, line, 0);
    }
}

impl fmt::Write for Device<'_, Display> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s);
        Ok(())
    }
}

fn color_op(op: u8, red: f32, green: f32, blue: f32, alpha: f32) -> [u8; 5] {
    [
        op,
        unit_to_byte(red),
        unit_to_byte(green),
        unit_to_byte(blue),
        unit_to_byte(alpha),
    ]
}

/// Clip the position and length of one rectangle dimension to what the
/// display accepts. Offscreen ranges become `(0, 0)`.
fn clip_range(mut pos: i32, mut len: i32, max: i32) -> (u8, u8) {
    if pos < CLIP_LEFT {
        len += pos - CLIP_LEFT;
        pos = CLIP_LEFT;
    }
    if len <= 0 || pos >= max {
        return (0, 0);
    }
    (coord_byte(pos), len.min(255) as u8)
}
