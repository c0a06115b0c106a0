//! The common part of every device driver.
//!
//! Drivers are owned by the [`Port`](crate::Port) they are attached to. The
//! caller keeps a [`DeviceHandle`], a typed index into the port's device
//! table, and borrows the driver through
//! [`Port::device`](crate::Port::device) when it wants to use it. The borrow
//! is a [`Device`], which pairs the driver with a [`DeviceContext`] for
//! talking to the peripheral.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::bus::{Bus, DeviceRecord};
use crate::types::{Address, DeviceId};

/// Dynamic access to the concrete driver type behind a `dyn Driver`.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Implemented by every device type that can be attached to a [`Port`](crate::Port).
pub trait Driver: AsAny + 'static {
    /// The type string reported by matching peripherals, e.g. `"co.modulo.knob"`.
    fn device_type(&self) -> &'static str;

    /// Handle an event pushed by the peripheral.
    fn on_event(&mut self, ctx: &mut DeviceContext<'_>, code: u8, data: u16);

    /// Called after the device has been given an address.
    fn on_resolved(&mut self, _ctx: &mut DeviceContext<'_>) {}

    /// Called after a global reset cleared the device's address.
    fn reset(&mut self) {}
}

/// A user callback, invoked with the device that received the event.
pub type Callback<T> = Box<dyn FnMut(&mut Device<'_, T>)>;

/// Typed reference to a driver attached to a [`Port`](crate::Port).
///
/// Slots are reused after a detach; the generation tells the old and the
/// new occupant apart.
pub struct DeviceHandle<T> {
    pub(crate) slot: usize,
    pub(crate) generation: u32,
    _driver: PhantomData<fn() -> T>,
}

impl<T> DeviceHandle<T> {
    pub(crate) fn new(slot: usize, generation: u32) -> Self {
        Self {
            slot,
            generation,
            _driver: PhantomData,
        }
    }
}

impl<T> Clone for DeviceHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DeviceHandle<T> {}

impl<T> PartialEq for DeviceHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl<T> Eq for DeviceHandle<T> {}

impl<T> fmt::Debug for DeviceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeviceHandle")
            .field(&self.slot)
            .field(&self.generation)
            .finish()
    }
}

/// Bus access for one attached device.
pub struct DeviceContext<'a> {
    bus: &'a mut Bus,
    slot: usize,
}

impl<'a> DeviceContext<'a> {
    pub(crate) fn new(bus: &'a mut Bus, slot: usize) -> Self {
        Self { bus, slot }
    }

    pub fn reborrow(&mut self) -> DeviceContext<'_> {
        DeviceContext {
            bus: self.bus,
            slot: self.slot,
        }
    }

    /// Send `command` with `data` to the device and wait for `reply_len` bytes.
    ///
    /// The device's address is resolved first if needed. Returns `None` if the
    /// device can't be found or didn't answer with enough data.
    pub fn transfer(&mut self, command: u8, data: &[u8], reply_len: u8) -> Option<Vec<u8>> {
        self.bus.device_transfer(self.slot, command, data, reply_len)
    }

    /// The device's bus address, resolving it if needed.
    pub fn address(&mut self) -> Option<Address> {
        self.bus.resolve(self.slot)
    }

    /// The device id of the bound peripheral, resolving it if needed.
    pub fn device_id(&mut self) -> Option<DeviceId> {
        self.bus.resolve(self.slot);
        self.record()?.device_id()
    }

    pub fn record(&self) -> Option<&DeviceRecord> {
        self.bus.record(self.slot)
    }

    fn is_resolved(&self) -> bool {
        self.record().and_then(DeviceRecord::address).is_some()
    }
}

/// Resolve the device in `ctx`, running the driver's `on_resolved` hook if
/// the address was newly assigned.
pub(crate) fn resolve(ctx: &mut DeviceContext<'_>, driver: &mut dyn Driver) -> Option<Address> {
    if ctx.is_resolved() {
        return ctx.address();
    }
    let address = ctx.address()?;
    driver.on_resolved(ctx);
    Some(address)
}

/// A borrowed, attached driver. Derefs to the driver's cached state.
pub struct Device<'a, T> {
    ctx: DeviceContext<'a>,
    driver: &'a mut T,
}

impl<'a, T: Driver> Device<'a, T> {
    pub(crate) fn new(ctx: DeviceContext<'a>, driver: &'a mut T) -> Self {
        Self { ctx, driver }
    }

    /// See [`DeviceContext::transfer`].
    pub fn transfer(&mut self, command: u8, data: &[u8], reply_len: u8) -> Option<Vec<u8>> {
        self.address()?;
        self.ctx.transfer(command, data, reply_len)
    }

    /// The device's bus address, or `None` if no matching peripheral was found.
    pub fn address(&mut self) -> Option<Address> {
        resolve(&mut self.ctx, &mut *self.driver)
    }

    /// The device id of the peripheral this device is bound to.
    pub fn device_id(&mut self) -> Option<DeviceId> {
        self.address();
        self.ctx.record()?.device_id()
    }

    /// Bind this device to the peripheral with `device_id`.
    pub fn set_device_id(&mut self, device_id: impl Into<DeviceId>) {
        self.ctx.bus.set_device_id(self.ctx.slot, device_id.into());
    }

    pub fn context(&mut self) -> &mut DeviceContext<'a> {
        &mut self.ctx
    }

    pub(crate) fn split(&mut self) -> (&mut DeviceContext<'a>, &mut T) {
        (&mut self.ctx, &mut *self.driver)
    }
}

impl<T> Deref for Device<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &*self.driver
    }
}

impl<T> DerefMut for Device<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.driver
    }
}

/// Invoke the callback selected by `select`, if one is set.
///
/// The callback is taken out of the driver while it runs, so it can borrow
/// the driver mutably. It is put back unless it installed a replacement.
pub(crate) fn fire<T: Driver>(
    driver: &mut T,
    ctx: &mut DeviceContext<'_>,
    select: impl Fn(&mut T) -> &mut Option<Callback<T>>,
) {
    if let Some(mut callback) = select(driver).take() {
        callback(&mut Device::new(ctx.reborrow(), &mut *driver));
        let slot = select(driver);
        if slot.is_none() {
            *slot = Some(callback);
        }
    }
}
