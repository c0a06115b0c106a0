//! Host-side driver stack for Modulo peripheral boards.
//!
//! Peripherals share one bus behind a Modulo Controller, which is connected
//! to the host over USB serial. A [`Port`] owns that connection: it finds
//! peripherals, hands out bus addresses, and dispatches the events the
//! peripherals push to the attached drivers.
//!
//! ## Example
//! ```no_run
//! use modulo::{Knob, Port, PortConfig};
//!
//! # fn main() -> Result<(), modulo::Error> {
//! let mut port = Port::open(&PortConfig::default())?;
//! let mut knob = Knob::new();
//! knob.on_position_change(|knob| {
//!     let hue = knob.angle() / 360.0;
//!     knob.set_hsv(hue, 1.0, 1.0);
//! });
//! port.attach(knob);
//! port.run_forever();
//! # }
//! ```

mod buffer;
pub mod bus;
pub mod device;
pub mod drivers;
mod error;
pub mod framing;
pub mod link;
mod nom_parser;
pub mod packet;
mod port;
pub mod transport;
pub mod types;

pub use crate::bus::{Bus, DeviceRecord};
pub use crate::device::{Device, DeviceContext, DeviceHandle, Driver};
pub use crate::drivers::{
    BlankSlate, Display, Joystick, Knob, MotorDriver, MotorMode, TemperatureProbe,
};
pub use crate::error::{Error, Result};
pub use crate::link::{Link, LinkConfig};
pub use crate::port::{Port, PortConfig};
pub use crate::types::{Address, DeviceId, StatusLed};
