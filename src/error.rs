use snafu::Snafu;

use crate::types;

/// Errors returned to the caller. Timeouts and missing replies are not
/// errors on this bus; they show up as `None` from the affected call.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// No serial port matching a Modulo Controller was found.
    #[snafu(display("Couldn't find a Modulo Controller connected via USB"))]
    NoController,
    /// The serial ports of the host couldn't be listed.
    #[snafu(display("Failed to list serial ports: {}", source))]
    ListPorts { source: serialport::Error },
    /// The serial port exists but couldn't be opened.
    #[snafu(display("Failed to open {}: {}", path, source))]
    Open {
        path: String,
        source: serialport::Error,
    },
    /// Writing to the link failed.
    #[snafu(display("IO error on the controller link: {}", source))]
    Io { source: std::io::Error },
    /// An argument was out of range.
    #[snafu(context(false), display("{}", source))]
    Type { source: types::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
