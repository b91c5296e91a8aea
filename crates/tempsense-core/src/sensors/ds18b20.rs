use embedded_hal_async::delay::DelayNs;
use log::{debug, warn};

use super::onewire::{OneWire, OneWireError, crc8};
use super::{SensorError, TemperatureProbe};
use crate::config::{MAX_SENSORS, SensorConfig};

pub const FAMILY_CODE: u8 = 0x28;

const CMD_CONVERT_T: u8 = 0x44;
const CMD_READ_SCRATCHPAD: u8 = 0xBE;

/// Worst-case conversion time at 12-bit resolution
pub const CONVERSION_TIME_MS: u32 = 750;

/// Register value after power-up, before the first conversion completes
pub const POWER_ON_RESET_CELSIUS: f32 = 85.0;

/// The nine scratchpad bytes, CRC verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratchpad([u8; 9]);

impl Scratchpad {
    pub fn from_bytes(bytes: [u8; 9]) -> Result<Self, OneWireError> {
        let computed = crc8(&bytes[..8]);
        if computed != bytes[8] {
            return Err(OneWireError::Crc {
                computed,
                received: bytes[8],
            });
        }
        Ok(Self(bytes))
    }

    /// Conversion resolution in bits (9 to 12), from the configuration register.
    pub const fn resolution_bits(&self) -> u8 {
        9 + ((self.0[4] >> 5) & 0b11)
    }

    /// Two's-complement temperature in 1/16 °C, with the bits that are
    /// undefined at lower resolutions cleared.
    pub const fn raw_temperature(&self) -> i16 {
        let raw = i16::from_le_bytes([self.0[0], self.0[1]]);
        let undefined_bits = 12 - self.resolution_bits();
        raw & !((1 << undefined_bits) - 1)
    }

    pub fn celsius(&self) -> f32 {
        f32::from(self.raw_temperature()) / 16.0
    }
}

/// DS18B20 sensors, one per one-wire bus, looked up by data pin.
pub struct Ds18b20Probe<B, D> {
    buses: heapless::Vec<(u8, B), MAX_SENSORS>,
    delay: D,
}

impl<B, D> Ds18b20Probe<B, D>
where
    B: OneWire,
    D: DelayNs,
{
    pub fn new(delay: D) -> Self {
        Self {
            buses: heapless::Vec::new(),
            delay,
        }
    }

    /// Register the bus driving `pin`. Returns the bus back when the table is full.
    pub fn add_bus(&mut self, pin: u8, bus: B) -> Result<(), B> {
        if let Some(slot) = self.buses.iter_mut().find(|(p, _)| *p == pin) {
            slot.1 = bus;
            return Ok(());
        }
        self.buses.push((pin, bus)).map_err(|(_, bus)| bus)
    }

    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }
}

impl<B, D> TemperatureProbe for Ds18b20Probe<B, D>
where
    B: OneWire,
    D: DelayNs,
{
    async fn read_celsius(&mut self, sensor: &SensorConfig) -> Result<f32, SensorError> {
        let pin = sensor.pin;
        let Self { buses, delay } = self;
        let bus = buses
            .iter_mut()
            .find(|(p, _)| *p == pin)
            .map(|(_, bus)| bus)
            .ok_or(SensorError::NoBus { pin })?;

        let on_bus = |error: OneWireError| match error {
            OneWireError::NoPresence => SensorError::NotPresent { pin },
            error => SensorError::Bus { pin, error },
        };

        if let Some(rom) = &sensor.address {
            if rom.family_code() != FAMILY_CODE {
                warn!("{}: ROM {} is not a DS18B20 family code", sensor.id, rom);
            }
        }

        bus.select(sensor.address.as_ref()).map_err(on_bus)?;
        bus.write_byte(CMD_CONVERT_T).map_err(on_bus)?;

        delay.delay_ms(CONVERSION_TIME_MS).await;

        bus.select(sensor.address.as_ref()).map_err(on_bus)?;
        bus.write_byte(CMD_READ_SCRATCHPAD).map_err(on_bus)?;
        let mut bytes = [0u8; 9];
        bus.read_bytes(&mut bytes).map_err(on_bus)?;

        let scratchpad = Scratchpad::from_bytes(bytes).map_err(on_bus)?;
        debug!(
            "{}: raw {:#06x} at {}-bit resolution",
            sensor.id,
            scratchpad.raw_temperature(),
            scratchpad.resolution_bits()
        );

        Ok(scratchpad.celsius())
    }
}
