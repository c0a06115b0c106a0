//! The bus controller: owns the link, the attached drivers, and the event loop.

use log::{debug, info, trace, warn};

use crate::bus::Bus;
use crate::device::{self, Device, DeviceContext, DeviceHandle, Driver};
use crate::error::Result;
use crate::link::{Link, LinkConfig};
use crate::packet::{Event, Packet};
use crate::transport::Transport;
use crate::types::{Address, DeviceId, StatusLed};

/// How to open a [`Port`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub link: LinkConfig,
    /// Reset every peripheral after connecting, so no stale addresses from
    /// an earlier session can collide with the ones handed out now.
    pub reset_on_open: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            reset_on_open: true,
        }
    }
}

/// A connection to one Modulo Controller and the devices attached to it.
///
/// ## Example
/// ```no_run
/// use modulo::{Knob, Port, PortConfig};
///
/// # fn main() -> Result<(), modulo::Error> {
/// let mut port = Port::open(&PortConfig::default())?;
/// let knob = port.attach(Knob::new());
/// if let Some(mut knob) = port.device(knob) {
///     knob.set_color(1.0, 0.0, 0.0);
/// }
/// port.run_forever();
/// # }
/// ```
pub struct Port {
    bus: Bus,
    drivers: Vec<DriverSlot>,
}

/// A driver table entry, parallel to the bus registry.
#[derive(Default)]
struct DriverSlot {
    /// Bumped on every detach, so handles to the old driver stop working.
    generation: u32,
    driver: Option<Box<dyn Driver>>,
}

impl DriverSlot {
    fn get_mut(&mut self, generation: u32) -> Option<&mut (dyn Driver + 'static)> {
        if self.generation != generation {
            return None;
        }
        self.driver.as_deref_mut()
    }
}

impl Port {
    /// Find the controller described by `config`, connect to it and
    /// optionally reset the bus.
    /// # Errors
    /// Fails if the serial port can't be found or opened, or if writing the
    /// connection handshake fails.
    pub fn open(config: &PortConfig) -> Result<Self> {
        let link = config.link.open()?;
        Self::with_link(Box::new(link), config.reset_on_open)
    }

    /// Connect over an already opened link.
    /// # Errors
    /// Returns [`Error::Io`](crate::Error::Io) if writing the handshake fails.
    pub fn with_link(link: Box<dyn Link>, reset_on_open: bool) -> Result<Self> {
        let transport = Transport::connect(link)?;
        info!("Connected to Modulo Controller");
        let mut port = Self {
            bus: Bus::new(transport),
            drivers: Vec::new(),
        };
        if reset_on_open {
            port.global_reset();
        }
        Ok(port)
    }

    /// Attach `driver`, binding it to the first present peripheral of its
    /// type that no other attached device claims.
    pub fn attach<T: Driver>(&mut self, driver: T) -> DeviceHandle<T> {
        self.attach_driver(driver, None)
    }

    /// Attach `driver`, binding it to the peripheral with `device_id`.
    pub fn attach_with_id<T: Driver>(
        &mut self,
        driver: T,
        device_id: impl Into<DeviceId>,
    ) -> DeviceHandle<T> {
        self.attach_driver(driver, Some(device_id.into()))
    }

    fn attach_driver<T: Driver>(&mut self, driver: T, device_id: Option<DeviceId>) -> DeviceHandle<T> {
        let slot = self.bus.register(driver.device_type(), device_id);
        debug!("Attached {} in slot {}", driver.device_type(), slot);
        if slot == self.drivers.len() {
            self.drivers.push(DriverSlot::default());
        }
        let entry = &mut self.drivers[slot];
        entry.driver = Some(Box::new(driver));
        DeviceHandle::new(slot, entry.generation)
    }

    /// Remove a device from the port and hand the driver back.
    /// Events for its peripheral are dropped from now on.
    pub fn detach<T: Driver>(&mut self, handle: DeviceHandle<T>) -> Option<T> {
        let entry = self.drivers.get_mut(handle.slot)?;
        if !entry.get_mut(handle.generation)?.as_any().is::<T>() {
            return None;
        }
        let driver = entry.driver.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.bus.unregister(handle.slot);
        driver.into_any().downcast::<T>().ok().map(|driver| *driver)
    }

    /// Borrow an attached device. `None` after it was detached.
    pub fn device<T: Driver>(&mut self, handle: DeviceHandle<T>) -> Option<Device<'_, T>> {
        let driver = self
            .drivers
            .get_mut(handle.slot)?
            .get_mut(handle.generation)?
            .as_any_mut()
            .downcast_mut::<T>()?;
        Some(Device::new(
            DeviceContext::new(&mut self.bus, handle.slot),
            driver,
        ))
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    /// Reset every peripheral and forget all assigned addresses.
    pub fn global_reset(&mut self) {
        self.bus.global_reset();
        let drivers = self.drivers.iter_mut();
        for driver in drivers.filter_map(|entry| entry.driver.as_deref_mut()) {
            driver.reset();
        }
    }

    /// Every device id present on the bus, in ascending order.
    pub fn device_ids(&mut self) -> Vec<DeviceId> {
        self.bus.device_ids()
    }

    pub fn device_type(&mut self, device_id: impl Into<DeviceId>) -> Option<String> {
        self.bus.device_type(device_id.into())
    }

    pub fn version(&mut self, device_id: impl Into<DeviceId>) -> Option<u16> {
        self.bus.version(device_id.into())
    }

    pub fn set_status_led(&mut self, device_id: impl Into<DeviceId>, status: StatusLed) {
        self.bus.set_status_led(device_id.into(), status);
    }

    pub fn exit_bootloader(&mut self) {
        self.bus.exit_bootloader();
    }

    /// Resolve every attached device, then dispatch pending events.
    ///
    /// With `no_wait == false` the first read blocks for up to the link
    /// timeout. Returns whether any packet was processed.
    pub fn run_once(&mut self, no_wait: bool) -> bool {
        for slot in self.bus.slots() {
            self.resolve(slot);
        }

        let mut processed = false;
        let mut next = self.bus.next_packet(!no_wait);
        while let Some(packet) = next {
            processed = true;
            match packet {
                Packet::Event(event) => self.dispatch(event),
                Packet::Echo => {}
                packet => warn!("Unexpected out-of-band packet {:?}", packet),
            }
            next = self.bus.next_packet(false);
        }
        processed
    }

    /// Run the event loop until the process exits.
    pub fn run_forever(&mut self) -> ! {
        loop {
            self.run_once(false);
        }
    }

    /// Tell the controller that the host is done.
    /// # Errors
    /// Returns [`Error::Io`](crate::Error::Io) if writing to the link fails.
    pub fn close(&mut self) -> Result<()> {
        self.bus.transport_mut().close()
    }

    fn resolve(&mut self, slot: usize) -> Option<Address> {
        let driver = self.drivers.get_mut(slot)?.driver.as_deref_mut()?;
        device::resolve(&mut DeviceContext::new(&mut self.bus, slot), driver)
    }

    fn dispatch(&mut self, event: Event) {
        let driver = self
            .bus
            .slot_of(event.device_id)
            .and_then(|slot| Some((slot, self.drivers.get_mut(slot)?.driver.as_deref_mut()?)));
        match driver {
            Some((slot, driver)) => {
                trace!("Event {} for {} in slot {}", event.code, event.device_id, slot);
                driver.on_event(
                    &mut DeviceContext::new(&mut self.bus, slot),
                    event.code,
                    event.data,
                );
            }
            None => debug!("Dropping event {} for unattached {}", event.code, event.device_id),
        }
    }
}
