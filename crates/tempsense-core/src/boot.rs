//! Boot controller: the debug-jumper gate in front of normal operation.
//!
//! The jumper is sampled before anything else happens. A grounded jumper
//! yields [`BootOutcome::Debug`] without touching configuration or sensors,
//! leaving the board free for interactive development. Otherwise the
//! configuration is loaded exactly once; a load failure is fatal.

use embedded_hal::digital::InputPin;
use log::{error, info, warn};

use crate::config::{Config, ConfigError};
use crate::status::Pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// Jumper grounded: stay out of the way
    Debug,
    Normal,
}

/// Terminal result of the boot sequence.
#[derive(Debug)]
pub enum BootOutcome {
    Debug,
    Fault(ConfigError),
    Ready(Config),
}

impl BootOutcome {
    /// LED pattern to hold when boot stops here, `None` when sensing may start.
    pub const fn halt_pattern(&self) -> Option<Pattern> {
        match self {
            Self::Debug => Some(Pattern::DEBUG),
            Self::Fault(_) => Some(Pattern::FAULT),
            Self::Ready(_) => None,
        }
    }

    /// The loaded configuration, or the pattern to halt with.
    pub fn into_config(self) -> Result<Config, Pattern> {
        match self {
            Self::Ready(config) => Ok(config),
            halted => Err(halted.halt_pattern().unwrap_or(Pattern::FAULT)),
        }
    }
}

pub struct BootController<J> {
    jumper: J,
}

impl<J: InputPin> BootController<J> {
    /// `jumper` must read high unless grounded (pull-up enabled).
    pub fn new(jumper: J) -> Self {
        Self { jumper }
    }

    pub fn mode(&mut self) -> BootMode {
        match self.jumper.is_low() {
            Ok(true) => BootMode::Debug,
            Ok(false) => BootMode::Normal,
            Err(e) => {
                // An unreadable jumper must not start sensing by accident
                warn!("Debug jumper unreadable ({:?}), assuming debug mode", e);
                BootMode::Debug
            }
        }
    }

    /// Run the debug gate, then `load` the configuration if normal operation is allowed.
    pub fn start<F>(&mut self, load: F) -> BootOutcome
    where
        F: FnOnce() -> Result<Config, ConfigError>,
    {
        if self.mode() == BootMode::Debug {
            info!("Debug jumper fitted, halting before normal operation");
            return BootOutcome::Debug;
        }

        match load() {
            Ok(config) => {
                info!(
                    "Configuration loaded: {} sensor(s), reporting to {}",
                    config.sensors.len(),
                    config.report.target.authority()
                );
                BootOutcome::Ready(config)
            }
            Err(e) => {
                error!("Configuration rejected: {}", e);
                BootOutcome::Fault(e)
            }
        }
    }
}
