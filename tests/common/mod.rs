#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

use modulo::framing::{self, Decoder};
use modulo::packet::{Event, Packet};
use modulo::types::DeviceId;
use modulo::{Link, Port};

pub type Handler = Box<dyn FnMut(u8, &[u8]) -> Option<Vec<u8>>>;

/// A simulated peripheral behind the controller.
pub struct Peripheral {
    pub device_id: u16,
    pub device_type: String,
    pub address: u8,
    pub version: u16,
    pub status_led: u8,
    /// Answers device transfers. `None` from the handler means no reply.
    handler: Option<Handler>,
}

impl Peripheral {
    pub fn new(device_id: u16, device_type: &str) -> Peripheral {
        Peripheral {
            device_id,
            device_type: device_type.to_string(),
            address: 0,
            version: 0x0102,
            status_led: 0,
            handler: None,
        }
    }

    pub fn with_address(mut self, address: u8) -> Peripheral {
        self.address = address;
        self
    }

    pub fn with_handler(
        mut self,
        handler: impl FnMut(u8, &[u8]) -> Option<Vec<u8>> + 'static,
    ) -> Peripheral {
        self.handler = Some(Box::new(handler));
        self
    }

    fn is_assigned(&self) -> bool {
        !matches!(self.address, 0 | 9 | 127)
    }
}

/// A simulated Modulo Controller. Requests written by the host are answered
/// immediately; the answers are read back by the host.
pub struct Controller {
    pub peripherals: Vec<Peripheral>,
    to_host: VecDeque<u8>,
    decoder: Decoder,
    /// Every packet received from the host, in order.
    pub requests: Vec<Packet>,
    /// Events sent right before the response to the next transfer.
    interleaved: Vec<Event>,
    pub quit: bool,
}

pub struct ControllerLink(Rc<RefCell<Controller>>);

impl Controller {
    pub fn new(peripherals: Vec<Peripheral>) -> Rc<RefCell<Controller>> {
        Rc::new(RefCell::new(Controller {
            peripherals,
            to_host: VecDeque::new(),
            decoder: Decoder::new(),
            requests: Vec::new(),
            interleaved: Vec::new(),
            quit: false,
        }))
    }

    pub fn link(controller: &Rc<RefCell<Controller>>) -> Box<dyn Link> {
        Box::new(ControllerLink(Rc::clone(controller)))
    }

    pub fn peripheral(&self, device_id: u16) -> &Peripheral {
        self.peripherals
            .iter()
            .find(|p| p.device_id == device_id)
            .expect("No such peripheral")
    }

    pub fn peripheral_mut(&mut self, device_id: u16) -> &mut Peripheral {
        self.peripherals
            .iter_mut()
            .find(|p| p.device_id == device_id)
            .expect("No such peripheral")
    }

    /// Push an event to the host right away.
    pub fn send_event(&mut self, device_id: u16, code: u8, data: u16) {
        let event = Event {
            code,
            device_id: DeviceId(device_id),
            data,
        };
        self.send(&Packet::Event(event));
    }

    /// Send an event in front of the response to the next transfer.
    pub fn interleave_event(&mut self, device_id: u16, code: u8, data: u16) {
        self.interleaved.push(Event {
            code,
            device_id: DeviceId(device_id),
            data,
        });
    }

    /// `(command, data)` of every transfer sent to `address`.
    pub fn transfers_to(&self, address: u8) -> Vec<(u8, Vec<u8>)> {
        self.requests
            .iter()
            .filter_map(|p| match p {
                Packet::Transfer {
                    address: a,
                    command,
                    data,
                    ..
                } if *a == address => Some((*command, data.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of broadcasts of `command`.
    pub fn broadcasts(&self, command: u8) -> usize {
        self.transfers_to(9)
            .iter()
            .filter(|(c, _)| *c == command)
            .count()
    }

    pub fn clear_requests(&mut self) {
        self.requests.clear();
    }

    pub fn pending_bytes(&self) -> usize {
        self.to_host.len()
    }

    fn send(&mut self, packet: &Packet) {
        self.to_host.extend(framing::encode(&packet.to_bytes()));
    }

    fn receive(&mut self, packet: Packet) {
        self.requests.push(packet.clone());
        match packet {
            Packet::Echo => self.send(&Packet::Echo),
            Packet::Quit => self.quit = true,
            Packet::Transfer {
                address,
                command,
                data,
                reply_len,
            } => {
                let reply = if address == 9 {
                    Some(self.broadcast(command, &data))
                } else {
                    self.device_transfer(address, command, &data)
                };
                for event in std::mem::take(&mut self.interleaved) {
                    self.send(&Packet::Event(event));
                }
                if let Some(mut reply) = reply {
                    if !reply.is_empty() {
                        reply.resize(reply_len.into(), 0);
                    }
                    self.send(&Packet::Response {
                        status: 1,
                        data: reply,
                    });
                }
            }
            _ => {}
        }
    }

    /// Broadcasts always get a response. An empty one means nobody answered.
    fn broadcast(&mut self, command: u8, data: &[u8]) -> Vec<u8> {
        let id = |data: &[u8]| u16::from_le_bytes([data[0], data[1]]);
        match command {
            0 => {
                for p in self.peripherals.iter_mut() {
                    p.address = 0;
                }
                vec![]
            }
            1 | 2 => {
                let from = id(data);
                self.peripherals
                    .iter()
                    .filter(|p| p.device_id >= from && (command == 1 || !p.is_assigned()))
                    .map(|p| p.device_id)
                    .min()
                    .map_or(vec![], |next| next.to_be_bytes().to_vec())
            }
            3 => {
                let device_id = id(data);
                if let Some(p) = self.peripherals.iter_mut().find(|p| p.device_id == device_id) {
                    p.address = data[2];
                }
                vec![]
            }
            4 => self.find(id(data)).map_or(vec![], |p| vec![p.address]),
            5 => self.find(id(data)).map_or(vec![], |p| {
                let mut reply = p.device_type.as_bytes().to_vec();
                reply.resize(31, 0);
                reply
            }),
            6 => self
                .find(id(data))
                .map_or(vec![], |p| p.version.to_le_bytes().to_vec()),
            9 => {
                let device_id = id(data);
                if let Some(p) = self.peripherals.iter_mut().find(|p| p.device_id == device_id) {
                    p.status_led = data[2];
                }
                vec![]
            }
            _ => vec![],
        }
    }

    fn find(&self, device_id: u16) -> Option<&Peripheral> {
        self.peripherals.iter().find(|p| p.device_id == device_id)
    }

    fn device_transfer(&mut self, address: u8, command: u8, data: &[u8]) -> Option<Vec<u8>> {
        let peripheral = self
            .peripherals
            .iter_mut()
            .find(|p| p.is_assigned() && p.address == address)?;
        match &mut peripheral.handler {
            Some(handler) => handler(command, data),
            None => Some(vec![0]),
        }
    }
}

impl Read for ControllerLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut controller = self.0.borrow_mut();
        let len = buf.len().min(controller.to_host.len());
        for (slot, byte) in buf.iter_mut().zip(controller.to_host.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

impl Write for ControllerLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut controller = self.0.borrow_mut();
        for &byte in buf {
            if let Some(frame) = controller.decoder.push(byte) {
                if let Some(packet) = Packet::parse(&frame) {
                    controller.receive(packet);
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for ControllerLink {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.0.borrow().to_host.len() as u32)
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Open a port on `controller`, resetting the bus.
pub fn open_port(controller: &Rc<RefCell<Controller>>) -> Port {
    init_logger();
    Port::with_link(Controller::link(controller), true).expect("Failed to connect")
}
