//! Broadcast commands, the device registry, and address assignment.

use log::{debug, info, warn};

use crate::link::Link;
use crate::packet::BroadcastCommand;
use crate::transport::Transport;
use crate::types::{Address, DeviceId, StatusLed, BROADCAST_ADDRESS};

/// Length of the device type string returned by the peripherals.
const DEVICE_TYPE_LEN: u8 = 31;

/// What the bus knows about one attached device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    device_id: Option<DeviceId>,
    device_type: &'static str,
    address: Option<Address>,
}

impl DeviceRecord {
    /// The device id, once known.
    pub fn device_id(&self) -> Option<DeviceId> {
        self.device_id
    }

    pub fn device_type(&self) -> &'static str {
        self.device_type
    }

    /// The assigned address, once resolved.
    pub fn address(&self) -> Option<Address> {
        self.address
    }
}

/// One controller link, the devices attached to it, and the addresses handed out.
pub struct Bus {
    transport: Transport<Box<dyn Link>>,
    last_assigned: Option<Address>,
    /// Addresses held by peripherals on the bus, attached or not. Queried on
    /// first allocation; known to be empty after a global reset.
    held: Option<Vec<Address>>,
    devices: Vec<Option<DeviceRecord>>,
}

impl Bus {
    pub fn new(transport: Transport<Box<dyn Link>>) -> Self {
        Self {
            transport,
            last_assigned: None,
            held: None,
            devices: Vec::new(),
        }
    }

    pub fn transport(&self) -> &Transport<Box<dyn Link>> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport<Box<dyn Link>> {
        &mut self.transport
    }

    /// Reset every peripheral on the bus, clearing all assigned addresses.
    pub fn global_reset(&mut self) {
        info!("Global reset");
        self.broadcast(BroadcastCommand::GlobalReset, &[], 0);
        for record in self.devices.iter_mut().flatten() {
            record.address = None;
        }
        self.last_assigned = None;
        self.held = Some(Vec::new());
    }

    /// Tell every peripheral to leave its bootloader and start normal operation.
    pub fn exit_bootloader(&mut self) {
        self.broadcast(BroadcastCommand::ExitBootloader, &[], 0);
    }

    /// The smallest present device id greater than `last`.
    pub fn next_device_id(&mut self, last: DeviceId) -> Option<DeviceId> {
        self.next_id(BroadcastCommand::GetNextDeviceId, last)
    }

    /// Like [`next_device_id`](Self::next_device_id), but only considers
    /// peripherals without an assigned address.
    pub fn next_unassigned_device_id(&mut self, last: DeviceId) -> Option<DeviceId> {
        self.next_id(BroadcastCommand::GetNextUnassignedDeviceId, last)
    }

    fn next_id(&mut self, command: BroadcastCommand, last: DeviceId) -> Option<DeviceId> {
        let next = last.0.checked_add(1)?;
        let reply = self.broadcast(command, &next.to_le_bytes(), 2)?;
        Some(DeviceId(u16::from_be_bytes([reply[0], reply[1]])))
    }

    /// Every device id present on the bus, in ascending order.
    pub fn device_ids(&mut self) -> Vec<DeviceId> {
        let mut ids = Vec::new();
        let mut last = DeviceId(0);
        while let Some(id) = self.next_device_id(last) {
            if id <= last {
                warn!("Enumeration went backwards from {} to {}", last, id);
                break;
            }
            ids.push(id);
            last = id;
        }
        ids
    }

    pub fn set_address(&mut self, device_id: DeviceId, address: Address) {
        let [lo, hi] = device_id.to_le_bytes();
        self.broadcast(BroadcastCommand::SetAddress, &[lo, hi, *address], 0);
    }

    /// The raw address reported by `device_id`, or `None` if it didn't answer.
    /// `0`, `9` and `127` mean that no address is assigned.
    pub fn get_address(&mut self, device_id: DeviceId) -> Option<u8> {
        let reply = self.broadcast(BroadcastCommand::GetAddress, &device_id.to_le_bytes(), 1)?;
        Some(reply[0])
    }

    /// The type string of `device_id`, e.g. `"co.modulo.knob"`.
    pub fn device_type(&mut self, device_id: DeviceId) -> Option<String> {
        let reply = self.broadcast(
            BroadcastCommand::GetDeviceType,
            &device_id.to_le_bytes(),
            DEVICE_TYPE_LEN,
        )?;
        let end = reply.iter().position(|&b| b == 0).unwrap_or(reply.len());
        Some(String::from_utf8_lossy(&reply[..end]).into_owned())
    }

    /// Firmware version of `device_id`.
    pub fn version(&mut self, device_id: DeviceId) -> Option<u16> {
        let reply = self.broadcast(BroadcastCommand::GetVersion, &device_id.to_le_bytes(), 2)?;
        Some(u16::from_le_bytes([reply[0], reply[1]]))
    }

    pub fn set_status_led(&mut self, device_id: DeviceId, status: StatusLed) {
        let [lo, hi] = device_id.to_le_bytes();
        self.broadcast(BroadcastCommand::SetStatusLed, &[lo, hi, status as u8], 0);
    }

    fn broadcast(&mut self, command: BroadcastCommand, data: &[u8], reply_len: u8) -> Option<Vec<u8>> {
        self.exchange(Some(BROADCAST_ADDRESS), command as u8, data, reply_len)
    }

    /// Transfer, treating a reply shorter than `reply_len` as no reply.
    fn exchange(
        &mut self,
        address: Option<u8>,
        command: u8,
        data: &[u8],
        reply_len: u8,
    ) -> Option<Vec<u8>> {
        let mut reply = self.transport.transfer(address, command, data, reply_len)?;
        if reply.len() < usize::from(reply_len) {
            return None;
        }
        reply.truncate(reply_len.into());
        Some(reply)
    }

    /// Add a device to the registry, returning its slot. Slots freed by
    /// [`unregister`](Self::unregister) are used first.
    pub(crate) fn register(&mut self, device_type: &'static str, device_id: Option<DeviceId>) -> usize {
        if let Some(device_id) = device_id {
            self.warn_if_claimed(device_id);
        }
        let record = Some(DeviceRecord {
            device_id,
            device_type,
            address: None,
        });
        match self.devices.iter().position(Option::is_none) {
            Some(slot) => {
                self.devices[slot] = record;
                slot
            }
            None => {
                self.devices.push(record);
                self.devices.len() - 1
            }
        }
    }

    /// Events for a device id go to the first device bound to it only.
    fn warn_if_claimed(&self, device_id: DeviceId) {
        if let Some(slot) = self.slot_of(device_id) {
            warn!("{} is already bound to the device in slot {}", device_id, slot);
        }
    }

    pub(crate) fn unregister(&mut self, slot: usize) -> Option<DeviceRecord> {
        self.devices.get_mut(slot)?.take()
    }

    pub fn record(&self, slot: usize) -> Option<&DeviceRecord> {
        self.devices.get(slot)?.as_ref()
    }

    fn record_mut(&mut self, slot: usize) -> Option<&mut DeviceRecord> {
        self.devices.get_mut(slot)?.as_mut()
    }

    /// Slots of all attached devices.
    pub(crate) fn slots(&self) -> Vec<usize> {
        (0..self.devices.len())
            .filter(|&slot| self.devices[slot].is_some())
            .collect()
    }

    /// The slot of the attached device bound to `device_id`.
    pub(crate) fn slot_of(&self, device_id: DeviceId) -> Option<usize> {
        self.devices
            .iter()
            .position(|r| matches!(r, Some(r) if r.device_id == Some(device_id)))
    }

    /// Bind the device in `slot` to another peripheral.
    pub(crate) fn set_device_id(&mut self, slot: usize, device_id: DeviceId) {
        match self.record(slot) {
            Some(record) if record.device_id != Some(device_id) => {}
            _ => return,
        }
        self.warn_if_claimed(device_id);
        if let Some(record) = self.record_mut(slot) {
            record.device_id = Some(device_id);
            record.address = None;
        }
    }

    /// Forget the address of the device in `slot`, so the next use queries the bus again.
    pub(crate) fn invalidate(&mut self, slot: usize) {
        if let Some(record) = self.record_mut(slot) {
            if record.address.take().is_some() {
                debug!("Lost contact with {:?}", record.device_id);
            }
        }
    }

    /// Address of the device in `slot`, finding the peripheral and assigning
    /// an address first if needed. `None` if no matching peripheral answers.
    pub(crate) fn resolve(&mut self, slot: usize) -> Option<Address> {
        let record = self.record(slot)?;
        if let Some(address) = record.address {
            return Some(address);
        }
        let device_type = record.device_type;
        let device_id = match record.device_id {
            Some(device_id) => device_id,
            None => {
                let device_id = self.find_unclaimed(device_type)?;
                self.record_mut(slot)?.device_id = Some(device_id);
                device_id
            }
        };

        let address = match Address::from_reported(self.get_address(device_id)?) {
            Some(address) => {
                if self.last_assigned.map_or(true, |last| last < address) {
                    self.last_assigned = Some(address);
                }
                self.hold(address);
                address
            }
            None => {
                let address = self.allocate_address()?;
                self.set_address(device_id, address);
                self.hold(address);
                debug!("Assigned address {} to {} {}", address, device_type, device_id);
                address
            }
        };
        self.record_mut(slot)?.address = Some(address);
        Some(address)
    }

    /// First present peripheral of `device_type` not bound to an attached device.
    fn find_unclaimed(&mut self, device_type: &str) -> Option<DeviceId> {
        let mut last = DeviceId(0);
        while let Some(device_id) = self.next_device_id(last) {
            if device_id <= last {
                break;
            }
            last = device_id;
            if self.slot_of(device_id).is_some() {
                continue;
            }
            if self.device_type(device_id).as_deref() == Some(device_type) {
                return Some(device_id);
            }
        }
        None
    }

    fn allocate_address(&mut self) -> Option<Address> {
        let held = self.held_addresses();
        let mut next = match self.last_assigned {
            Some(last) => last.next(),
            None => Some(Address::first()),
        };
        while let Some(address) = next {
            if !self.address_in_use(address) && !held.contains(&address) {
                self.last_assigned = Some(address);
                return Some(address);
            }
            next = address.next();
        }
        warn!("No free bus addresses left");
        None
    }

    /// Addresses already held by any present peripheral.
    fn held_addresses(&mut self) -> Vec<Address> {
        if let Some(held) = &self.held {
            return held.clone();
        }
        let mut held = Vec::new();
        for device_id in self.device_ids() {
            if let Some(address) = self.get_address(device_id).and_then(Address::from_reported) {
                debug!("{} already holds address {}", device_id, address);
                held.push(address);
            }
        }
        self.held = Some(held.clone());
        held
    }

    fn hold(&mut self, address: Address) {
        if let Some(held) = &mut self.held {
            if !held.contains(&address) {
                held.push(address);
            }
        }
    }

    fn address_in_use(&self, address: Address) -> bool {
        self.devices
            .iter()
            .flatten()
            .any(|r| r.address == Some(address))
    }

    pub(crate) fn next_packet(&mut self, blocking: bool) -> Option<crate::packet::Packet> {
        self.transport.next_packet(blocking)
    }

    /// Transfer to the device in `slot`. A missing reply invalidates its address.
    pub(crate) fn device_transfer(
        &mut self,
        slot: usize,
        command: u8,
        data: &[u8],
        reply_len: u8,
    ) -> Option<Vec<u8>> {
        let address = self.resolve(slot)?;
        let reply = self.exchange(Some(*address), command, data, reply_len);
        if reply.is_none() {
            self.invalidate(slot);
        }
        reply
    }
}
