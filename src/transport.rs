//! Packet exchange with the Modulo Controller.
//!
//! The [`Transport`] owns the [`Link`] and implements synchronous transfers
//! on top of it. Packets that arrive while a transfer waits for its response
//! are kept in an out-of-band queue and handed out, oldest first, by
//! [`Transport::next_packet`] before anything new is read from the link.

use std::collections::VecDeque;
use std::io::{self, ErrorKind};

use log::{debug, trace, warn};
use snafu::ResultExt;

use crate::buffer::Buffer;
use crate::error::{IoSnafu, Result};
use crate::framing::{self, Decoder};
use crate::link::Link;
use crate::packet::Packet;

pub struct Transport<L: Link> {
    link: L,
    rx: Buffer,
    decoder: Decoder,
    out_of_band: VecDeque<Packet>,
    closed: bool,
}

impl<L: Link> Transport<L> {
    /// Wrap `link` without performing the connection handshake.
    pub fn new(link: L) -> Self {
        Self {
            link,
            rx: Buffer::new(),
            decoder: Decoder::new(),
            out_of_band: VecDeque::new(),
            closed: false,
        }
    }

    /// Wrap `link` and wait until the controller answers.
    ///
    /// The controller's USB stack may swallow the first bytes after the port
    /// is opened, so echo packets are sent until any packet comes back.
    /// # Errors
    /// Returns [`Error::Io`](crate::Error::Io) if writing to the link fails.
    pub fn connect(link: L) -> Result<Self> {
        let mut transport = Self::new(link);
        let mut attempts: u32 = 0;
        loop {
            if let Some(packet) = transport.receive_packet() {
                debug!("Controller link up after {} echo attempts", attempts);
                if packet != Packet::Echo {
                    transport.out_of_band.push_back(packet);
                }
                return Ok(transport);
            }
            attempts += 1;
            transport.send_packet(&Packet::Echo).context(IoSnafu)?;
        }
    }

    /// Send a request to the peripheral at `address` and wait for the response.
    ///
    /// Returns the response payload, or `None` if `address` is `None`, the
    /// request couldn't be sent or no response arrived before the link timed
    /// out. Any other packet received while waiting is queued for
    /// [`next_packet`](Self::next_packet).
    pub fn transfer(
        &mut self,
        address: Option<u8>,
        command: u8,
        data: &[u8],
        reply_len: u8,
    ) -> Option<Vec<u8>> {
        let address = address?;
        if data.len() > usize::from(u8::MAX) {
            warn!(
                "Transfer to {} dropped, {} byte payload is too long",
                address,
                data.len()
            );
            return None;
        }
        let request = Packet::Transfer {
            address,
            command,
            data: data.to_vec(),
            reply_len,
        };
        if let Err(err) = self.send_packet(&request) {
            warn!("Failed to send transfer to {}: {}", address, err);
            return None;
        }

        loop {
            match self.receive_packet()? {
                Packet::Response { data, .. } => return Some(data),
                packet => {
                    trace!("Queueing out-of-band {:?}", packet);
                    self.out_of_band.push_back(packet);
                }
            }
        }
    }

    /// Return the oldest out-of-band packet, or receive one from the link.
    ///
    /// With `blocking == false` this returns `None` right away when nothing
    /// is queued and no bytes are waiting on the link.
    pub fn next_packet(&mut self, blocking: bool) -> Option<Packet> {
        if let Some(packet) = self.out_of_band.pop_front() {
            return Some(packet);
        }
        if !blocking && self.rx.is_empty() && self.pending_bytes() == 0 {
            return None;
        }
        self.receive_packet()
    }

    /// Packets received out of band and not yet handed out, oldest first.
    pub fn queued(&self) -> impl Iterator<Item = &Packet> {
        self.out_of_band.iter()
    }

    /// Tell the controller that the host is done. Does nothing after the first call.
    /// # Errors
    /// Returns [`Error::Io`](crate::Error::Io) if writing to the link fails.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.send_packet(&Packet::Quit).context(IoSnafu)
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn send_packet(&mut self, packet: &Packet) -> io::Result<()> {
        trace!("-> {:?}", packet);
        self.link.write_all(&framing::encode(&packet.to_bytes()))?;
        self.link.flush()
    }

    /// Receive one packet, skipping malformed frames.
    /// Returns `None` when the link has no more data.
    fn receive_packet(&mut self) -> Option<Packet> {
        loop {
            while let Some(byte) = self.rx.pop() {
                if let Some(frame) = self.decoder.push(byte) {
                    match Packet::parse(&frame) {
                        Some(packet) => {
                            trace!("<- {:?}", packet);
                            return Some(packet);
                        }
                        None => warn!("Discarding malformed packet {:02x?}", frame),
                    }
                }
            }

            match self.rx.fill_from(&mut self.link) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    break
                }
                Err(err) => {
                    warn!("Read from controller link failed: {}", err);
                    break;
                }
            }
        }

        if self.decoder.in_frame() {
            debug!("Dropping frame truncated by read timeout");
            self.decoder.reset();
        }
        None
    }

    fn pending_bytes(&mut self) -> u32 {
        self.link.bytes_to_read().unwrap_or_else(|err| {
            warn!("Failed to poll controller link: {}", err);
            0
        })
    }
}

impl<L: Link> Drop for Transport<L> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!("Failed to close controller link: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Event;
    use crate::types::DeviceId;
    use std::io::{Read, Write};

    /// Replays `rx` and records everything written.
    #[derive(Default)]
    struct Replay {
        rx: Vec<u8>,
        pos: usize,
        tx: Vec<u8>,
    }

    impl Replay {
        fn new(packets: &[Packet]) -> Self {
            let rx = packets
                .iter()
                .flat_map(|p| framing::encode(&p.to_bytes()))
                .collect();
            Self {
                rx,
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<Packet> {
            let mut decoder = Decoder::new();
            self.tx
                .iter()
                .filter_map(|&b| decoder.push(b))
                .filter_map(|frame| Packet::parse(&frame))
                .collect()
        }
    }

    impl Read for Replay {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(self.rx.len() - self.pos);
            buf[..len].copy_from_slice(&self.rx[self.pos..self.pos + len]);
            self.pos += len;
            Ok(len)
        }
    }

    impl Write for Replay {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Link for Replay {
        fn bytes_to_read(&mut self) -> io::Result<u32> {
            Ok((self.rx.len() - self.pos) as u32)
        }
    }

    fn event(code: u8, id: u16) -> Packet {
        Packet::Event(Event {
            code,
            device_id: DeviceId(id),
            data: 0,
        })
    }

    fn response(data: &[u8]) -> Packet {
        Packet::Response {
            status: 0,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_transfer_without_address() {
        let mut transport = Transport::new(Replay::new(&[response(&[1])]));
        assert_eq!(transport.transfer(None, 0, &[], 1), None);
        assert!(transport.link().tx.is_empty());
    }

    #[test]
    fn test_transfer_queues_out_of_band() {
        let mut transport = Transport::new(Replay::new(&[
            event(0, 5),
            Packet::Echo,
            event(1, 12),
            response(&[7, 8]),
            event(2, 5),
        ]));
        assert_eq!(transport.transfer(Some(10), 3, &[1, 2], 2), Some(vec![7, 8]));
        assert_eq!(
            transport.link().sent(),
            vec![Packet::Transfer {
                address: 10,
                command: 3,
                data: vec![1, 2],
                reply_len: 2
            }]
        );
        let queued: Vec<Packet> = transport.queued().cloned().collect();
        assert_eq!(queued, vec![event(0, 5), Packet::Echo, event(1, 12)]);

        // queued packets first, then the link
        assert_eq!(transport.next_packet(false), Some(event(0, 5)));
        assert_eq!(transport.next_packet(false), Some(Packet::Echo));
        assert_eq!(transport.next_packet(false), Some(event(1, 12)));
        assert_eq!(transport.next_packet(false), Some(event(2, 5)));
        assert_eq!(transport.next_packet(false), None);
        assert_eq!(transport.next_packet(true), None);
    }

    #[test]
    fn test_transfer_timeout() {
        let mut transport = Transport::new(Replay::new(&[event(0, 5)]));
        assert_eq!(transport.transfer(Some(10), 0, &[], 1), None);
        assert_eq!(transport.queued().count(), 1);
    }

    #[test]
    fn test_transfer_payload_too_long() {
        let mut transport = Transport::new(Replay::new(&[response(&[])]));
        assert_eq!(transport.transfer(Some(10), 0, &[0; 256], 0), None);
        assert!(transport.link().tx.is_empty());
    }

    #[test]
    fn test_malformed_and_truncated_frames() {
        let mut link = Replay::new(&[]);
        link.rx.extend(framing::encode(&[b'V', 1]));
        link.rx.extend(framing::encode(&[b'R', 0, 42]));
        link.rx.extend(&[framing::DELIMITER, b'V', 1]);
        let mut transport = Transport::new(link);
        assert_eq!(transport.transfer(Some(10), 0, &[], 1), Some(vec![42]));
        assert_eq!(transport.next_packet(true), None);
        assert_eq!(transport.next_packet(true), None);
    }

    #[test]
    fn test_connect_consumes_echo() {
        let mut transport =
            Transport::connect(Replay::new(&[Packet::Echo, event(0, 5)])).unwrap();
        assert!(transport.link().sent().is_empty());
        assert_eq!(transport.next_packet(false), Some(event(0, 5)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut transport = Transport::new(Replay::new(&[]));
        transport.close().unwrap();
        transport.close().unwrap();
        assert_eq!(transport.link().sent(), vec![Packet::Quit]);
    }
}
