//! Bit-banged one-wire bus master.
//!
//! The data line is an open-drain pin with an external pull-up (≈4.7 kΩ to
//! 3V3): driving it high releases the line, driving it low pulls it down.
//! Slot timings follow the standard-speed values from the Maxim DS18B20
//! datasheet and rely on a blocking microsecond delay.

use core::fmt;
use core::str::FromStr;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use thiserror_no_std::Error;

const CMD_READ_ROM: u8 = 0x33;
const CMD_MATCH_ROM: u8 = 0x55;
const CMD_SKIP_ROM: u8 = 0xCC;

const RESET_LOW_US: u32 = 480;
const PRESENCE_SAMPLE_US: u32 = 70;
const RESET_RECOVERY_US: u32 = 410;
const WRITE_ONE_LOW_US: u32 = 6;
const WRITE_ONE_RELEASE_US: u32 = 64;
const WRITE_ZERO_LOW_US: u32 = 60;
const WRITE_ZERO_RELEASE_US: u32 = 10;
const READ_LOW_US: u32 = 6;
const READ_SAMPLE_US: u32 = 9;
const READ_RECOVERY_US: u32 = 55;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneWireError {
    #[error("no device answered the reset pulse")]
    NoPresence,
    #[error("data line is held low (missing pull-up or short)")]
    BusStuckLow,
    #[error("GPIO access failed")]
    Pin,
    #[error("CRC mismatch: computed {computed:#04x}, received {received:#04x}")]
    Crc { computed: u8, received: u8 },
    #[error("ROM code must be 16 hex digits")]
    MalformedRom,
}

/// Dallas/Maxim CRC-8 (polynomial x⁸ + x⁵ + x⁴ + 1, reflected)
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut byte = byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}

/// 64-bit device ROM code: family byte, 48-bit serial, CRC byte.
///
/// Written as 16 hex digits in bus order, e.g. `28FF4B4C051603B2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RomAddress([u8; 8]);

impl RomAddress {
    pub fn from_bytes(bytes: [u8; 8]) -> Result<Self, OneWireError> {
        let computed = crc8(&bytes[..7]);
        if computed != bytes[7] {
            return Err(OneWireError::Crc {
                computed,
                received: bytes[7],
            });
        }
        Ok(Self(bytes))
    }

    pub const fn family_code(&self) -> u8 {
        self.0[0]
    }

    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl FromStr for RomAddress {
    type Err = OneWireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 16 || !s.is_ascii() {
            return Err(OneWireError::MalformedRom);
        }

        let mut bytes = [0u8; 8];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| OneWireError::MalformedRom)?;
        }
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for RomAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// Byte-level access to a one-wire bus
pub trait OneWire {
    /// Reset the bus and address one device, or every device when `address`
    /// is `None` (only meaningful with a single device on the line).
    fn select(&mut self, address: Option<&RomAddress>) -> Result<(), OneWireError>;

    fn write_byte(&mut self, byte: u8) -> Result<(), OneWireError>;

    fn read_byte(&mut self) -> Result<u8, OneWireError>;

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), OneWireError> {
        for byte in buf.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(())
    }
}

pub struct OneWireBus<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> OneWireBus<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(pin: P, delay: D) -> Self {
        Self { pin, delay }
    }

    fn drive_low(&mut self) -> Result<(), OneWireError> {
        self.pin.set_low().map_err(|_| OneWireError::Pin)
    }

    fn release_line(&mut self) -> Result<(), OneWireError> {
        self.pin.set_high().map_err(|_| OneWireError::Pin)
    }

    fn line_is_high(&mut self) -> Result<bool, OneWireError> {
        self.pin.is_high().map_err(|_| OneWireError::Pin)
    }

    /// Send a reset pulse; returns whether any device answered with a presence pulse.
    pub fn reset(&mut self) -> Result<bool, OneWireError> {
        self.release_line()?;
        if !self.line_is_high()? {
            return Err(OneWireError::BusStuckLow);
        }

        self.drive_low()?;
        self.delay.delay_us(RESET_LOW_US);
        self.release_line()?;
        self.delay.delay_us(PRESENCE_SAMPLE_US);
        let present = !self.line_is_high()?;
        self.delay.delay_us(RESET_RECOVERY_US);

        Ok(present)
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<(), OneWireError> {
        let (low, release) = if bit {
            (WRITE_ONE_LOW_US, WRITE_ONE_RELEASE_US)
        } else {
            (WRITE_ZERO_LOW_US, WRITE_ZERO_RELEASE_US)
        };
        self.drive_low()?;
        self.delay.delay_us(low);
        self.release_line()?;
        self.delay.delay_us(release);
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool, OneWireError> {
        self.drive_low()?;
        self.delay.delay_us(READ_LOW_US);
        self.release_line()?;
        self.delay.delay_us(READ_SAMPLE_US);
        let bit = self.line_is_high()?;
        self.delay.delay_us(READ_RECOVERY_US);
        Ok(bit)
    }

    /// Read the ROM code of the only device on the bus.
    pub fn read_rom(&mut self) -> Result<RomAddress, OneWireError> {
        if !self.reset()? {
            return Err(OneWireError::NoPresence);
        }
        self.write_byte(CMD_READ_ROM)?;
        let mut rom = [0u8; 8];
        self.read_bytes(&mut rom)?;
        RomAddress::from_bytes(rom)
    }
}

impl<P, D> OneWire for OneWireBus<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    fn select(&mut self, address: Option<&RomAddress>) -> Result<(), OneWireError> {
        if !self.reset()? {
            return Err(OneWireError::NoPresence);
        }
        match address {
            Some(rom) => {
                self.write_byte(CMD_MATCH_ROM)?;
                for &byte in rom.as_bytes() {
                    self.write_byte(byte)?;
                }
            }
            None => self.write_byte(CMD_SKIP_ROM)?,
        }
        Ok(())
    }

    // LSB first
    fn write_byte(&mut self, byte: u8) -> Result<(), OneWireError> {
        for i in 0..8 {
            self.write_bit(byte & (1 << i) != 0)?;
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, OneWireError> {
        let mut byte = 0u8;
        for i in 0..8 {
            if self.read_bit()? {
                byte |= 1 << i;
            }
        }
        Ok(byte)
    }
}
