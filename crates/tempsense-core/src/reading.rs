//! A single timestamped temperature measurement.

extern crate alloc;
use alloc::string::String;

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Unit readings are reported in, fixed by configuration
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "C",
            Self::Fahrenheit => "F",
        }
    }

    /// Express a driver value (always degrees Celsius) in this unit.
    pub fn from_celsius(self, celsius: f32) -> f32 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "C" | "c" | "Celsius" | "celsius" => Ok(Self::Celsius),
            "F" | "f" | "Fahrenheit" | "fahrenheit" => Ok(Self::Fahrenheit),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One measurement from one sensor.
///
/// Created by the sensing module for every successful poll and handed to the
/// reporting sink straight away; readings are never kept after that.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: Timestamp,
    pub sensor: String,
    pub value: f32,
    pub unit: TemperatureUnit,
}

impl Reading {
    /// Build a reading from a driver value in degrees Celsius.
    pub fn from_celsius(
        sensor: &str,
        celsius: f32,
        unit: TemperatureUnit,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            timestamp,
            sensor: sensor.into(),
            value: unit.from_celsius(celsius),
            unit,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {}{} at {}",
            self.sensor, self.value, self.unit, self.timestamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celsius_passes_through_unchanged() {
        let reading = Reading::from_celsius("S1", 21.5, TemperatureUnit::Celsius, Timestamp::from_unix(42));
        assert_eq!(reading.value, 21.5);
        assert_eq!(reading.unit, TemperatureUnit::Celsius);
        assert_eq!(reading.sensor, "S1");
        assert_eq!(reading.timestamp, Timestamp::from_unix(42));
    }

    #[test]
    fn test_fahrenheit_is_labelled_conversion() {
        let reading = Reading::from_celsius("S1", 100.0, TemperatureUnit::Fahrenheit, Timestamp::from_unix(0));
        assert_eq!(reading.value, 212.0);
        assert_eq!(reading.unit.symbol(), "F");

        assert_eq!(TemperatureUnit::Fahrenheit.from_celsius(-40.0), -40.0);
    }

    #[test]
    fn test_unit_from_str() {
        assert_eq!("C".parse(), Ok(TemperatureUnit::Celsius));
        assert_eq!("fahrenheit".parse(), Ok(TemperatureUnit::Fahrenheit));
        assert_eq!("K".parse::<TemperatureUnit>(), Err(()));
    }
}
