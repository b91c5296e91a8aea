mod ds18b20;
mod onewire;

use thiserror_no_std::Error;

use crate::config::SensorConfig;

pub use ds18b20::{
    CONVERSION_TIME_MS, Ds18b20Probe, FAMILY_CODE, POWER_ON_RESET_CELSIUS, Scratchpad,
};
pub use onewire::{OneWire, OneWireBus, OneWireError, RomAddress, crc8};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("no one-wire bus set up on GPIO{pin}")]
    NoBus { pin: u8 },
    #[error("no sensor answered on GPIO{pin}")]
    NotPresent { pin: u8 },
    #[error("one-wire fault on GPIO{pin}: {error}")]
    Bus { pin: u8, error: OneWireError },
    #[error("sensor unavailable: {0}")]
    Unavailable(&'static str),
}

/// The "read temperature" capability the sensing module depends on.
///
/// Implementations own the hardware access for every configured sensor and
/// look each one up from its [`SensorConfig`].
pub trait TemperatureProbe {
    /// Read one sensor, in degrees Celsius.
    fn read_celsius(
        &mut self,
        sensor: &SensorConfig,
    ) -> impl Future<Output = Result<f32, SensorError>>;
}

impl<P: TemperatureProbe + ?Sized> TemperatureProbe for &mut P {
    async fn read_celsius(&mut self, sensor: &SensorConfig) -> Result<f32, SensorError> {
        (**self).read_celsius(sensor).await
    }
}
