//! Board configuration loaded once at boot.
//!
//! The settings file is parsed into an immutable [`Config`] that the boot
//! controller owns and lends to the sensing module. Any missing required key
//! or malformed value is a [`ConfigError`], which is fatal at startup.

mod settings;

pub use settings::Settings;

use alloc::string::{String, ToString};

use core::str::FromStr;

use log::LevelFilter;
use thiserror_no_std::Error;

use crate::reading::TemperatureUnit;
use crate::report::RetryPolicy;
use crate::report::http::HttpTarget;
use crate::sensors::RomAddress;

/// Maximum number of sensors a board can be configured with
pub const MAX_SENSORS: usize = 16;
/// Maximum number of Wi-Fi networks tried in turn
pub const MAX_NETWORKS: usize = 4;
/// Maximum number of pins driven high as auxiliary 3V3 rails
pub const MAX_EXTRA_HOTS: usize = 8;
/// Highest GPIO number on the ESP32-S3
pub const MAX_GPIO: u8 = 48;

pub const DEFAULT_POLL_INTERVAL_SECS: u32 = 40 * 60;
pub const DEFAULT_FAILURE_RETRY_SECS: u32 = 10 * 60;
pub const DEFAULT_UTC_OFFSET_HOURS: i8 = -5;
pub const DEFAULT_NTP_SERVER: &str = "pool.ntp.org";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("settings line {line} is not a KEY = value pair")]
    MalformedLine { line: usize },
    #[error("required setting {0} is missing")]
    MissingKey(&'static str),
    #[error("setting {key} has invalid value {value:?}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("setting {key} allows at most {max} entries")]
    TooManyEntries { key: &'static str, max: usize },
    #[error("sensor id {0:?} is configured more than once")]
    DuplicateSensor(String),
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: &'static str) -> Self {
        Self::InvalidValue {
            key,
            value: value.to_string(),
            reason,
        }
    }
}

/// One temperature sensor wired to its own data pin
#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    /// Identifier used in reports
    pub id: String,
    /// GPIO number of the one-wire data line
    pub pin: u8,
    /// ROM address to match; `None` addresses the only device on the line
    pub address: Option<RomAddress>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WifiNetwork {
    /// Human-friendly label used in logs
    pub name: String,
    pub ssid: String,
    pub password: String,
}

/// Where and how readings are published
#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub target: HttpTarget,
    pub token: Option<String>,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sensors: heapless::Vec<SensorConfig, MAX_SENSORS>,
    pub wifi: heapless::Vec<WifiNetwork, MAX_NETWORKS>,
    pub report: ReportConfig,
    pub unit: TemperatureUnit,
    /// Rest after a cycle in which everything was read and reported
    pub poll_interval_secs: u32,
    /// Rest after a cycle with any failure
    pub failure_retry_secs: u32,
    pub reset_after_cycle: bool,
    pub utc_offset_hours: i8,
    pub ntp_server: String,
    pub extra_hots: heapless::Vec<u8, MAX_EXTRA_HOTS>,
    pub warm_up: bool,
    pub log_level: LevelFilter,
}

impl Config {
    /// Build a configuration from the text of a settings file.
    pub fn from_settings(text: &str) -> Result<Self, ConfigError> {
        let settings = Settings::parse(text)?;

        let sensors = parse_sensors(required(&settings, "SENSORS")?)?;

        let report_url = required(&settings, "REPORT_URL")?;
        let target = HttpTarget::parse(report_url)
            .map_err(|reason| ConfigError::invalid("REPORT_URL", report_url, reason))?;

        let wifi = match settings.get("WIFI") {
            Some(value) => parse_networks(value)?,
            None => heapless::Vec::new(),
        };

        let extra_hots = match settings.get("EXTRA_HOTS") {
            Some(value) => parse_extra_hots(value)?,
            None => heapless::Vec::new(),
        };

        let unit = match settings.get("TEMPERATURE_UNIT") {
            Some(value) => TemperatureUnit::from_str(value)
                .map_err(|_| ConfigError::invalid("TEMPERATURE_UNIT", value, "expected C or F"))?,
            None => TemperatureUnit::Celsius,
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: number(&settings, "REPORT_RETRIES", defaults.max_retries)?,
            initial_delay_ms: number(&settings, "REPORT_RETRY_DELAY_MS", defaults.initial_delay_ms)?,
            ..defaults
        };

        let utc_offset_hours = number(&settings, "UTC_OFFSET_HOURS", DEFAULT_UTC_OFFSET_HOURS)?;
        if !(-12..=14).contains(&utc_offset_hours) {
            return Err(ConfigError::invalid(
                "UTC_OFFSET_HOURS",
                settings.get("UTC_OFFSET_HOURS").unwrap_or_default(),
                "offset must be between -12 and 14",
            ));
        }

        let poll_interval_secs =
            number(&settings, "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "POLL_INTERVAL_SECS",
                "0",
                "interval must be positive",
            ));
        }

        let log_level = match settings.get("LOG_LEVEL") {
            Some(value) => LevelFilter::from_str(value)
                .map_err(|_| ConfigError::invalid("LOG_LEVEL", value, "unknown log level"))?,
            None => LevelFilter::Info,
        };

        Ok(Self {
            sensors,
            wifi,
            report: ReportConfig {
                target,
                token: settings
                    .get("REPORT_TOKEN")
                    .filter(|t| !t.is_empty())
                    .map(ToString::to_string),
                retry,
            },
            unit,
            poll_interval_secs,
            failure_retry_secs: number(
                &settings,
                "FAILURE_RETRY_SECS",
                DEFAULT_FAILURE_RETRY_SECS,
            )?,
            reset_after_cycle: flag(&settings, "RESET_AFTER_CYCLE", true)?,
            utc_offset_hours,
            ntp_server: settings
                .get("NTP_SERVER")
                .unwrap_or(DEFAULT_NTP_SERVER)
                .to_string(),
            extra_hots,
            warm_up: flag(&settings, "WARM_UP", true)?,
            log_level,
        })
    }

    /// The firmware cannot reach its time server or sink without a network.
    pub fn require_wifi(&self) -> Result<(), ConfigError> {
        if self.wifi.is_empty() {
            return Err(ConfigError::MissingKey("WIFI"));
        }
        Ok(())
    }

    /// Rest period after a cycle, in seconds
    pub fn rest_secs(&self, cycle_succeeded: bool) -> u32 {
        if cycle_succeeded {
            self.poll_interval_secs
        } else {
            self.failure_retry_secs
        }
    }
}

fn required<'s>(settings: &'s Settings<'_>, key: &'static str) -> Result<&'s str, ConfigError> {
    settings
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingKey(key))
}

fn number<T: FromStr>(settings: &Settings<'_>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match settings.get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(key, value, "expected a number")),
        None => Ok(default),
    }
}

fn flag(settings: &Settings<'_>, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match settings.get(key).map(str::trim) {
        Some("true" | "True" | "1") => Ok(true),
        Some("false" | "False" | "0") => Ok(false),
        Some(other) => Err(ConfigError::invalid(key, other, "expected true or false")),
        None => Ok(default),
    }
}

/// Parse a pin name such as `GP4`, `GPIO4` or `4`.
pub fn parse_pin(name: &str) -> Option<u8> {
    let name = name.trim();
    let digits = name
        .strip_prefix("GPIO")
        .or_else(|| name.strip_prefix("GP"))
        .unwrap_or(name);
    let pin: u8 = digits.parse().ok()?;
    (pin <= MAX_GPIO).then_some(pin)
}

/// Entries look like `id,GP4` or `id,GP4,28FF4B4C051603B2`, separated by `;`.
fn parse_sensors(value: &str) -> Result<heapless::Vec<SensorConfig, MAX_SENSORS>, ConfigError> {
    let mut sensors: heapless::Vec<SensorConfig, MAX_SENSORS> = heapless::Vec::new();

    for entry in value.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let mut fields = entry.split(',').map(str::trim);
        let (Some(id), Some(pin_name)) = (fields.next(), fields.next()) else {
            return Err(ConfigError::invalid("SENSORS", entry, "expected id,pin"));
        };
        if id.is_empty() {
            return Err(ConfigError::invalid("SENSORS", entry, "sensor id is empty"));
        }
        let pin = parse_pin(pin_name)
            .ok_or_else(|| ConfigError::invalid("SENSORS", entry, "unknown pin name"))?;
        let address = match fields.next() {
            Some(rom) => Some(
                RomAddress::from_str(rom)
                    .map_err(|_| ConfigError::invalid("SENSORS", entry, "bad ROM address"))?,
            ),
            None => None,
        };
        if fields.next().is_some() {
            return Err(ConfigError::invalid("SENSORS", entry, "too many fields"));
        }
        if sensors.iter().any(|s| s.id == id) {
            return Err(ConfigError::DuplicateSensor(id.to_string()));
        }

        sensors
            .push(SensorConfig {
                id: id.to_string(),
                pin,
                address,
            })
            .map_err(|_| ConfigError::TooManyEntries {
                key: "SENSORS",
                max: MAX_SENSORS,
            })?;
    }

    if sensors.is_empty() {
        return Err(ConfigError::MissingKey("SENSORS"));
    }
    Ok(sensors)
}

/// Entries look like `label,ssid,password`, separated by `;`.
fn parse_networks(value: &str) -> Result<heapless::Vec<WifiNetwork, MAX_NETWORKS>, ConfigError> {
    let mut networks = heapless::Vec::new();

    for entry in value.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let mut fields = entry.split(',').map(str::trim);
        let (Some(name), Some(ssid), Some(password), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(ConfigError::invalid(
                "WIFI",
                entry,
                "expected label,ssid,password",
            ));
        };
        if ssid.is_empty() {
            return Err(ConfigError::invalid("WIFI", entry, "ssid is empty"));
        }

        networks
            .push(WifiNetwork {
                name: name.to_string(),
                ssid: ssid.to_string(),
                password: password.to_string(),
            })
            .map_err(|_| ConfigError::TooManyEntries {
                key: "WIFI",
                max: MAX_NETWORKS,
            })?;
    }

    Ok(networks)
}

fn parse_extra_hots(value: &str) -> Result<heapless::Vec<u8, MAX_EXTRA_HOTS>, ConfigError> {
    let mut pins = heapless::Vec::new();
    for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let pin =
            parse_pin(name).ok_or_else(|| ConfigError::invalid("EXTRA_HOTS", name, "unknown pin name"))?;
        pins.push(pin).map_err(|_| ConfigError::TooManyEntries {
            key: "EXTRA_HOTS",
            max: MAX_EXTRA_HOTS,
        })?;
    }
    Ok(pins)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "SENSORS = \"porch,GP4\"\nREPORT_URL = \"http://collector.local/readings\"\n";

    #[test]
    fn test_minimal_settings_use_defaults() {
        let config = Config::from_settings(MINIMAL).unwrap();

        assert_eq!(config.sensors.len(), 1);
        assert_eq!(config.sensors[0].id, "porch");
        assert_eq!(config.sensors[0].pin, 4);
        assert_eq!(config.sensors[0].address, None);
        assert_eq!(config.unit, TemperatureUnit::Celsius);
        assert_eq!(config.poll_interval_secs, 2400);
        assert_eq!(config.failure_retry_secs, 600);
        assert!(config.reset_after_cycle);
        assert!(config.warm_up);
        assert_eq!(config.utc_offset_hours, -5);
        assert_eq!(config.ntp_server, "pool.ntp.org");
        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(config.report.token, None);
        assert_eq!(config.report.retry, RetryPolicy::default());
        assert!(config.wifi.is_empty());
        assert!(config.extra_hots.is_empty());
    }

    #[test]
    fn test_full_settings() {
        let text = r#"
            SENSORS = "porch,GP4; attic , GPIO12 , 28ff4b4c051603b2"
            WIFI = "home,HomeNet,secret;phone,Hotspot,hunter2"
            REPORT_URL = "http://10.0.0.5:8080/api/contents"
            REPORT_TOKEN = "abc123"
            TEMPERATURE_UNIT = "F"
            POLL_INTERVAL_SECS = 300
            FAILURE_RETRY_SECS = 60
            RESET_AFTER_CYCLE = false
            REPORT_RETRIES = 5
            REPORT_RETRY_DELAY_MS = 250
            UTC_OFFSET_HOURS = 2
            NTP_SERVER = "time.example.org"
            EXTRA_HOTS = "GP2,GP3"
            WARM_UP = false
            LOG_LEVEL = "debug"
        "#;
        let config = Config::from_settings(text).unwrap();

        assert_eq!(config.sensors.len(), 2);
        assert_eq!(config.sensors[1].id, "attic");
        assert_eq!(config.sensors[1].pin, 12);
        assert_eq!(
            config.sensors[1].address,
            Some(RomAddress::from_str("28FF4B4C051603B2").unwrap())
        );
        assert_eq!(config.wifi.len(), 2);
        assert_eq!(config.wifi[1].name, "phone");
        assert_eq!(config.wifi[1].ssid, "Hotspot");
        assert_eq!(config.wifi[1].password, "hunter2");
        assert_eq!(config.report.target.host, "10.0.0.5");
        assert_eq!(config.report.target.port, 8080);
        assert_eq!(config.report.token.as_deref(), Some("abc123"));
        assert_eq!(config.report.retry.max_retries, 5);
        assert_eq!(config.report.retry.initial_delay_ms, 250);
        assert_eq!(config.unit, TemperatureUnit::Fahrenheit);
        assert_eq!(config.rest_secs(true), 300);
        assert_eq!(config.rest_secs(false), 60);
        assert!(!config.reset_after_cycle);
        assert_eq!(config.utc_offset_hours, 2);
        assert_eq!(config.ntp_server, "time.example.org");
        assert_eq!(config.extra_hots.as_slice(), &[2, 3]);
        assert!(!config.warm_up);
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert!(config.require_wifi().is_ok());
    }

    #[test]
    fn test_missing_required_keys() {
        let err = Config::from_settings("REPORT_URL = \"http://a/b\"").unwrap_err();
        assert_eq!(err, ConfigError::MissingKey("SENSORS"));

        let err = Config::from_settings("SENSORS = \"a,GP1\"").unwrap_err();
        assert_eq!(err, ConfigError::MissingKey("REPORT_URL"));

        let err = Config::from_settings("SENSORS = \"\"\nREPORT_URL = \"http://a/b\"").unwrap_err();
        assert_eq!(err, ConfigError::MissingKey("SENSORS"));

        let err = Config::from_settings("").unwrap_err();
        assert_eq!(err, ConfigError::MissingKey("SENSORS"));
    }

    #[test]
    fn test_wifi_required_only_on_request() {
        let config = Config::from_settings(MINIMAL).unwrap();
        assert_eq!(config.require_wifi(), Err(ConfigError::MissingKey("WIFI")));
    }

    #[test]
    fn test_rejects_malformed_values() {
        let cases = [
            "SENSORS = \"porch\"",
            "SENSORS = \"porch,GP99\"",
            "SENSORS = \"porch,GP4,nothex\"",
            "SENSORS = \"porch,GP4,28FF4B4C051603B2,extra\"",
            "SENSORS = \"a,GP1\"\nTEMPERATURE_UNIT = \"K\"",
            "SENSORS = \"a,GP1\"\nPOLL_INTERVAL_SECS = soon",
            "SENSORS = \"a,GP1\"\nPOLL_INTERVAL_SECS = 0",
            "SENSORS = \"a,GP1\"\nRESET_AFTER_CYCLE = maybe",
            "SENSORS = \"a,GP1\"\nUTC_OFFSET_HOURS = 20",
            "SENSORS = \"a,GP1\"\nWIFI = \"home,onlyssid\"",
            "SENSORS = \"a,GP1\"\nEXTRA_HOTS = \"GPX\"",
            "SENSORS = \"a,GP1\"\nLOG_LEVEL = \"loud\"",
        ];
        for case in cases {
            let text = alloc::format!("{case}\nREPORT_URL = \"http://a/b\"");
            let err = Config::from_settings(&text).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { .. }),
                "{case:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_rejects_https_report_url() {
        let err = Config::from_settings("SENSORS = \"a,GP1\"\nREPORT_URL = \"https://api.github.com/x\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "REPORT_URL", .. }));
    }

    #[test]
    fn test_rejects_duplicate_sensor_ids() {
        let err = Config::from_settings("SENSORS = \"a,GP1;a,GP2\"\nREPORT_URL = \"http://a/b\"")
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateSensor("a".into()));
    }

    #[test]
    fn test_parse_pin_names() {
        assert_eq!(parse_pin("GP4"), Some(4));
        assert_eq!(parse_pin("GPIO21"), Some(21));
        assert_eq!(parse_pin(" 7 "), Some(7));
        assert_eq!(parse_pin("GP49"), None);
        assert_eq!(parse_pin("LED"), None);
    }
}
