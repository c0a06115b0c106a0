//! Packets exchanged with the Modulo Controller, after framing is removed.
//!
//! The first byte of every packet is a type code. See [`Packet`] for the
//! layout of each packet type.

use crate::nom_parser;
use crate::types::DeviceId;

pub const CODE_TRANSFER: u8 = b'T';
pub const CODE_RESPONSE: u8 = b'R';
pub const CODE_EVENT: u8 = b'V';
pub const CODE_ECHO: u8 = b'X';
pub const CODE_QUIT: u8 = b'Q';

/// Opcodes understood by every peripheral when sent to the broadcast address.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum BroadcastCommand {
    GlobalReset = 0,
    GetNextDeviceId = 1,
    GetNextUnassignedDeviceId = 2,
    SetAddress = 3,
    GetAddress = 4,
    GetDeviceType = 5,
    GetVersion = 6,
    GetEvent = 7,
    ClearEvent = 8,
    SetStatusLed = 9,
    ExitBootloader = 100,
}

/// An asynchronous notification pushed by a peripheral.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Event {
    pub code: u8,
    pub device_id: DeviceId,
    pub data: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Host request: `T, address, command, data.len(), reply_len, data...`
    Transfer {
        address: u8,
        command: u8,
        data: Vec<u8>,
        reply_len: u8,
    },
    /// Controller reply to a transfer: `R, status, data...`
    Response { status: u8, data: Vec<u8> },
    /// `V, code, device_id (LE), data (LE)`
    Event(Event),
    Echo,
    Quit,
    /// A packet with a type code this host doesn't know.
    Unknown(Vec<u8>),
}

impl Packet {
    /// Parse a decoded frame. Returns `None` if a known packet type is malformed.
    pub fn parse(frame: &[u8]) -> Option<Packet> {
        nom_parser::parse_packet(frame)
    }

    /// On-wire representation, before framing.
    ///
    /// # Panics
    /// Panics if the payload of a `Transfer` is longer than 255 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Packet::Transfer {
                address,
                command,
                data,
                reply_len,
            } => {
                let len = u8::try_from(data.len()).expect("Transfer payload too long");
                let mut buf = vec![CODE_TRANSFER, *address, *command, len, *reply_len];
                buf.extend_from_slice(data);
                buf
            }
            Packet::Response { status, data } => {
                let mut buf = vec![CODE_RESPONSE, *status];
                buf.extend_from_slice(data);
                buf
            }
            Packet::Event(event) => {
                let mut buf = vec![CODE_EVENT, event.code];
                buf.extend_from_slice(&event.device_id.to_le_bytes());
                buf.extend_from_slice(&event.data.to_le_bytes());
                buf
            }
            Packet::Echo => vec![CODE_ECHO],
            Packet::Quit => vec![CODE_QUIT],
            Packet::Unknown(bytes) => bytes.clone(),
        }
    }
}

impl From<Event> for Packet {
    fn from(event: Event) -> Self {
        Packet::Event(event)
    }
}
