//! The byte stream between the host and the Modulo Controller.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, info};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use snafu::{OptionExt, ResultExt};

use crate::error::{ListPortsSnafu, NoControllerSnafu, OpenSnafu, Result};

/// USB vendor id of the Modulo Controller.
pub const CONTROLLER_VID: u16 = 0x16D0;
/// USB product id of the Modulo Controller.
pub const CONTROLLER_PID: u16 = 0x0B58;

/// A bidirectional byte stream with a read timeout.
///
/// Reads that time out either return `Ok(0)` or an error of kind
/// [`io::ErrorKind::TimedOut`]; both mean "no data".
pub trait Link: Read + Write {
    /// Number of bytes that can be read without blocking.
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

impl Link for dyn SerialPort {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        SerialPort::bytes_to_read(self).map_err(Into::into)
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        (**self).bytes_to_read()
    }
}

/// How to find and open the controller's serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Explicit serial port path. Skips USB discovery when set.
    pub path: Option<String>,
    /// Which controller to use when several are connected, in enumeration order.
    pub controller: usize,
    /// Read timeout of the port. Bounds how long a transfer waits for its reply.
    pub timeout: Duration,
    pub baud_rate: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            path: None,
            controller: 0,
            timeout: Duration::from_millis(100),
            baud_rate: 115_200,
        }
    }
}

impl LinkConfig {
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn controller(mut self, controller: usize) -> Self {
        self.controller = controller;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Find the controller port and open it.
    /// # Errors
    /// [`Error::NoController`](crate::Error::NoController) if no matching port exists,
    /// or the serial port errors from listing or opening it.
    pub fn open(&self) -> Result<Box<dyn SerialPort>> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => self.find_controller()?,
        };
        info!("Opening Modulo Controller at {}", path);
        serialport::new(&path, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .context(OpenSnafu { path })
    }

    fn find_controller(&self) -> Result<String> {
        let ports = serialport::available_ports().context(ListPortsSnafu)?;
        debug!("Available serial ports: {:?}", ports);
        let path = controller_ports(&ports)
            .nth(self.controller)
            .map(|port| port.port_name.clone())
            .context(NoControllerSnafu);
        path
    }
}

/// The ports in `ports` that belong to a Modulo Controller.
pub fn controller_ports(ports: &[SerialPortInfo]) -> impl Iterator<Item = &SerialPortInfo> {
    ports.iter().filter(|port| match &port.port_type {
        SerialPortType::UsbPort(usb) => usb.vid == CONTROLLER_VID && usb.pid == CONTROLLER_PID,
        _ => false,
    })
}
