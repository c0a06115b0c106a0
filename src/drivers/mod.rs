//! Typed drivers for the Modulo peripherals.

mod blank_slate;
pub mod display;
mod joystick;
mod knob;
mod motor;
mod temperature;

pub use blank_slate::BlankSlate;
pub use display::Display;
pub use joystick::Joystick;
pub use knob::Knob;
pub use motor::{MotorDriver, MotorMode};
pub use temperature::TemperatureProbe;
