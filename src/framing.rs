//! Packet framing used on the controller link.
//!
//! A frame is the payload wrapped in [`DELIMITER`] bytes. Payload bytes equal
//! to the delimiter or to [`ESCAPE`] are sent as `ESCAPE, byte ^ ESCAPE_MASK`,
//! so an unescaped delimiter only ever marks a frame boundary.

pub const DELIMITER: u8 = 0x7E;
pub const ESCAPE: u8 = 0x7D;
pub const ESCAPE_MASK: u8 = 1 << 5;

/// Encode `payload` into a complete frame, including both delimiters.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.push(DELIMITER);
    for &byte in payload {
        if byte == DELIMITER || byte == ESCAPE {
            frame.push(ESCAPE);
            frame.push(byte ^ ESCAPE_MASK);
        } else {
            frame.push(byte);
        }
    }
    frame.push(DELIMITER);
    frame
}

/// Decode the first complete frame in `bytes`.
///
/// Returns `None` if `bytes` ends before a frame is closed.
pub fn decode(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = Decoder::new();
    bytes.iter().find_map(|&byte| decoder.push(byte))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    /// Discarding bytes until a delimiter shows up.
    Hunting,
    /// Seen a delimiter, skipping any repeats.
    FrameStart,
    Body,
    Escape,
}

/// Streaming frame decoder, fed one byte at a time.
#[derive(Debug)]
pub struct Decoder {
    state: State,
    payload: Vec<u8>,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            state: State::Hunting,
            payload: Vec::new(),
        }
    }

    /// Feed one byte into the decoder. Returns the payload when `byte`
    /// closes a non-empty frame.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        match (self.state, byte) {
            (State::Hunting, DELIMITER) => self.state = State::FrameStart,
            (State::Hunting, _) => {}
            (State::FrameStart, DELIMITER) => {}
            (State::Body, DELIMITER) => {
                // The closing delimiter may also open the next frame.
                self.state = State::FrameStart;
                return Some(std::mem::take(&mut self.payload));
            }
            (State::Escape, DELIMITER) => {
                // An escape can't be followed by a frame boundary, drop the frame.
                self.payload.clear();
                self.state = State::FrameStart;
            }
            (State::FrameStart | State::Body, ESCAPE) => self.state = State::Escape,
            (State::FrameStart | State::Body, _) => {
                self.payload.push(byte);
                self.state = State::Body;
            }
            (State::Escape, _) => {
                self.payload.push(byte ^ ESCAPE_MASK);
                self.state = State::Body;
            }
        }
        None
    }

    /// Drop any partially received frame and resynchronize on the next delimiter.
    pub fn reset(&mut self) {
        self.state = State::Hunting;
        self.payload.clear();
    }

    /// True while a frame has been opened but not yet closed.
    pub fn in_frame(&self) -> bool {
        matches!(self.state, State::Body | State::Escape)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
