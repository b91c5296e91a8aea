//! GPIO setup for sensor buses and auxiliary power pins
//!
//! Sensor and power pins come from the settings file, so they are claimed by
//! number at runtime instead of through the typed peripheral singletons. The
//! numbers are checked against the pins the board already uses.

use esp_hal::delay::Delay;
use esp_hal::gpio::{AnyPin, DriveMode, Flex, Level, Output, OutputConfig, Pull};
use log::{error, info, warn};
use tempsense_core::config::{Config, MAX_EXTRA_HOTS, MAX_SENSORS};
use tempsense_core::sensors::{Ds18b20Probe, OneWire, OneWireBus, OneWireError, RomAddress};

/// Status LED
pub const LED_PIN: u8 = 2;
/// Debug jumper, grounded to enter debug mode
pub const DEBUG_JUMPER_PIN: u8 = 10;

/// Pins that configuration may not claim: board I/O, strapping pins, USB,
/// SPI flash and octal PSRAM.
const RESERVED_PINS: &[u8] = &[
    0, LED_PIN, 3, DEBUG_JUMPER_PIN, 19, 20, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 45,
    46,
];

/// SD card SPI pins, in use when the card is fitted
#[cfg(feature = "sd-card")]
pub const SD_CARD_PINS: &[u8] = &[11, 12, 13, 14];

fn claimable(pin: u8) -> bool {
    #[cfg(feature = "sd-card")]
    if SD_CARD_PINS.contains(&pin) {
        return false;
    }
    !RESERVED_PINS.contains(&pin)
}

/// Runs every bus transaction with interrupts masked so slot timing holds.
pub struct Guarded<B>(B);

impl<B: OneWire> OneWire for Guarded<B> {
    fn select(&mut self, address: Option<&RomAddress>) -> Result<(), OneWireError> {
        critical_section::with(|_| self.0.select(address))
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), OneWireError> {
        critical_section::with(|_| self.0.write_byte(byte))
    }

    fn read_byte(&mut self) -> Result<u8, OneWireError> {
        critical_section::with(|_| self.0.read_byte())
    }
}

pub type SensorBus = Guarded<OneWireBus<Flex<'static>, Delay>>;
pub type SensorProbe = Ds18b20Probe<SensorBus, embassy_time::Delay>;

/// Claim `pin` as an open-drain line, released (high).
fn open_drain(pin: u8) -> Flex<'static> {
    // SAFETY: `claimable` keeps runtime-claimed pins apart from the typed
    // peripherals used elsewhere, and each number is claimed once.
    let mut flex = Flex::new(unsafe { AnyPin::steal(pin) });
    flex.apply_output_config(
        &OutputConfig::default()
            .with_drive_mode(DriveMode::OpenDrain)
            .with_pull(Pull::None),
    );
    flex.set_input_enable(true);
    flex.set_output_enable(true);
    flex.set_high();
    flex
}

/// One one-wire bus per distinct sensor pin.
///
/// Sensors on unusable pins are left without a bus; reading them fails
/// every cycle with a "no bus" error instead of stopping the board.
pub fn sensor_probe(config: &Config) -> SensorProbe {
    let mut probe = Ds18b20Probe::new(embassy_time::Delay);
    let mut claimed: heapless::Vec<u8, MAX_SENSORS> = heapless::Vec::new();

    for sensor in &config.sensors {
        if claimed.contains(&sensor.pin) {
            continue;
        }
        if !claimable(sensor.pin) {
            error!("{}: GPIO{} is reserved, sensor disabled", sensor.id, sensor.pin);
            continue;
        }

        let mut bus = OneWireBus::new(open_drain(sensor.pin), Delay::new());
        match sensor.address {
            // A lone device can report its ROM code, handy when filling in SENSORS
            None => match critical_section::with(|_| bus.read_rom()) {
                Ok(rom) => info!("GPIO{}: found device {}", sensor.pin, rom),
                Err(e) => warn!("GPIO{}: {}", sensor.pin, e),
            },
            Some(_) => match critical_section::with(|_| bus.reset()) {
                Ok(true) => info!("GPIO{}: one-wire device present", sensor.pin),
                Ok(false) => warn!("GPIO{}: no presence pulse", sensor.pin),
                Err(e) => warn!("GPIO{}: {}", sensor.pin, e),
            },
        }

        if probe.add_bus(sensor.pin, Guarded(bus)).is_err() || claimed.push(sensor.pin).is_err() {
            error!("Too many one-wire buses, GPIO{} skipped", sensor.pin);
        }
    }

    info!("{} one-wire bus(es) ready", probe.bus_count());
    probe
}

/// Drive the configured pins high so sensors can be powered from GPIO.
///
/// The returned outputs must be kept alive for the pins to stay high.
pub fn drive_extra_hots(config: &Config) -> heapless::Vec<Output<'static>, MAX_EXTRA_HOTS> {
    let mut outputs = heapless::Vec::new();

    for &pin in &config.extra_hots {
        if !claimable(pin) || config.sensors.iter().any(|s| s.pin == pin) {
            error!("GPIO{} cannot be used as a power pin", pin);
            continue;
        }
        // SAFETY: checked against reserved and sensor pins above
        let output = Output::new(unsafe { AnyPin::steal(pin) }, Level::High, OutputConfig::default());
        info!("GPIO{} driven high", pin);
        if outputs.push(output).is_err() {
            break;
        }
    }

    outputs
}
