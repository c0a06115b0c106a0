//! This module defines range-checked types for Modulo bus addresses and
//! device identifiers, plus the small wire conversions shared by the drivers.

use snafu::{ensure, OptionExt, Snafu};

use core::convert::TryInto;
use core::fmt;
use core::ops::Deref;

/// Error type for this module
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// The value can't be assigned to a peripheral as a bus address.
    #[snafu(display("Invalid address"))]
    InvalidAddress,
    /// The button index is outside of the buttons present on the device.
    #[snafu(display("Invalid button {}", button))]
    InvalidButton { button: u8 },
}

const fn invalid_address() -> InvalidAddressSnafu {
    InvalidAddressSnafu
}

/// The reserved address used for broadcast commands.
pub const BROADCAST_ADDRESS: u8 = 9;

/// Address values a peripheral reports when no address has been assigned.
const UNASSIGNED: [u8; 3] = [0, BROADCAST_ADDRESS, 127];

/// Address is a dynamically assigned 8-bit peripheral address.
///
/// `0`, `127` and the broadcast address are never valid peripheral addresses.
///
/// ## Example
/// ```
/// use modulo::Address;
/// let addr = Address::new(10).unwrap();
/// assert_eq!(*addr, 10);
/// assert!(Address::new(9).is_err());
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct Address(u8);

impl Address {
    /// Create a new address, checking that it isn't one of the reserved values.
    /// # Errors
    /// Returns [`Error::InvalidAddress`] if `address` is out of range or reserved.
    pub fn new(address: impl TryInto<u8>) -> Result<Self, Error> {
        let address = address.try_into().ok().with_context(invalid_address)?;
        ensure!(!is_unassigned(address), invalid_address());
        Ok(Self(address))
    }

    /// Interpret an address reported by a peripheral.
    /// Returns `None` for the "unassigned" sentinels.
    pub(crate) fn from_reported(address: u8) -> Option<Self> {
        Self::new(address).ok()
    }

    /// The address following this one, skipping the reserved values.
    pub(crate) fn next(self) -> Option<Self> {
        (self.0.checked_add(1)?..=u8::MAX).find_map(|a| Self::new(a).ok())
    }

    /// The lowest address that may be handed out after a reset.
    pub(crate) const fn first() -> Self {
        Self(BROADCAST_ADDRESS + 1)
    }
}

pub(crate) const fn is_unassigned(address: u8) -> bool {
    address == UNASSIGNED[0] || address == UNASSIGNED[1] || address == UNASSIGNED[2]
}

impl Deref for Address {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<u8> for Address {
    fn eq(&self, other: &u8) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The permanent 16-bit factory identifier of a peripheral.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct DeviceId(pub u16);

impl DeviceId {
    pub(crate) const fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

impl From<u16> for DeviceId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl From<DeviceId> for u16 {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl Deref for DeviceId {
    type Target = u16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<u16> for DeviceId {
    fn eq(&self, other: &u16) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// State of the status LED present on every peripheral.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusLed {
    Off = 0,
    On = 1,
    Blinking = 2,
}

/// Clamp `x` to [0, 1] and scale it to a byte.
pub(crate) fn unit_to_byte(x: f32) -> u8 {
    (x.clamp(0.0, 1.0) * 255.0) as u8
}

/// Two's complement byte encoding of a signed coordinate, clamped to the i8 range.
pub(crate) fn coord_byte(x: i32) -> u8 {
    x.clamp(i8::MIN.into(), i8::MAX.into()) as i8 as u8
}

#[cfg(test)]
mod address_tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        for n in 1..=255u8 {
            let a = Address::new(n);
            if n == 9 || n == 127 {
                assert_eq!(a, Err(Error::InvalidAddress));
            } else {
                assert_eq!(*a.unwrap(), n);
            }
        }
    }

    #[test]
    fn test_address() {
        assert!(Address::new(0).is_err());
        assert!(Address::new(256).is_err());
        assert!(Address::new(-1).is_err());
        assert_eq!(Address::from_reported(127), None);
        assert_eq!(Address::from_reported(12), Some(Address(12)));
    }

    #[test]
    fn test_address_next() {
        assert_eq!(Address::first(), Address(10));
        assert_eq!(Address(10).next(), Some(Address(11)));
        assert_eq!(Address(126).next(), Some(Address(128)));
        assert_eq!(Address(254).next(), Some(Address(255)));
        assert_eq!(Address(255).next(), None);
    }
}
