//! Temperature probe.

use log::debug;

use crate::device::{fire, Callback, Device, DeviceContext, Driver};

const FUNCTION_GET_TEMPERATURE: u8 = 0;

const EVENT_TEMPERATURE_CHANGED: u8 = 0;

/// Driver for `co.modulo.tempprobe`.
#[derive(Default)]
pub struct TemperatureProbe {
    /// Tenths of a degree Celsius.
    temperature: i16,
    valid: bool,
    on_change: Option<Callback<TemperatureProbe>>,
}

impl TemperatureProbe {
    pub const DEVICE_TYPE: &'static str = "co.modulo.tempprobe";

    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a temperature has been read from the probe.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn celsius(&self) -> f32 {
        f32::from(self.temperature) / 10.0
    }

    pub fn fahrenheit(&self) -> f32 {
        f32::from(self.temperature) * 1.8 / 10.0 + 32.0
    }

    /// Called whenever a new temperature is read or reported.
    pub fn on_change(
        &mut self,
        callback: impl FnMut(&mut Device<'_, TemperatureProbe>) + 'static,
    ) -> &mut Self {
        self.on_change = Some(Box::new(callback));
        self
    }

    fn update(&mut self, ctx: &mut DeviceContext<'_>, temperature: i16) {
        self.temperature = temperature;
        self.valid = true;
        fire(self, ctx, |probe| &mut probe.on_change);
    }
}

impl Driver for TemperatureProbe {
    fn device_type(&self) -> &'static str {
        Self::DEVICE_TYPE
    }

    fn on_event(&mut self, ctx: &mut DeviceContext<'_>, code: u8, data: u16) {
        match code {
            EVENT_TEMPERATURE_CHANGED => self.update(ctx, data as i16),
            _ => debug!("Unknown temperature probe event {}", code),
        }
    }

    fn on_resolved(&mut self, ctx: &mut DeviceContext<'_>) {
        match ctx.transfer(FUNCTION_GET_TEMPERATURE, &[], 2) {
            Some(reply) => self.update(ctx, i16::from_le_bytes([reply[0], reply[1]])),
            None => self.valid = false,
        }
    }
}
