//! Run stages and application-level errors for tempsense

use core::fmt::{Debug, Write};

use thiserror_no_std::Error;

/// Stages of a normal boot, in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Booting,
    ConnectingWifi,
    SyncingTime,
    Reporting,
    Complete,
}

impl RunState {
    /// Flashes shown on the status LED when the stage begins
    pub const fn flash_count(self) -> u8 {
        match self {
            Self::Booting => 1,
            Self::ConnectingWifi => 2,
            Self::SyncingTime => 3,
            Self::Reporting => 4,
            Self::Complete => 5,
        }
    }
}

pub type Detail = heapless::String<64>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("WiFi connection failed: {0}")]
    Wifi(Detail),
    #[error("Time sync failed: {0}")]
    TimeSync(Detail),
    #[error("Network error: {0}")]
    Network(Detail),
}

impl AppError {
    pub fn wifi(cause: impl Debug) -> Self {
        Self::Wifi(detail(cause))
    }

    pub fn time_sync(cause: impl Debug) -> Self {
        Self::TimeSync(detail(cause))
    }

    pub fn network(cause: impl Debug) -> Self {
        Self::Network(detail(cause))
    }
}

/// Debug text of `cause`; anything past the capacity of [`Detail`] is lost.
fn detail(cause: impl Debug) -> Detail {
    let mut text = Detail::new();
    let _ = write!(text, "{:?}", cause);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_flash_counts() {
        let counts = [
            RunState::Booting,
            RunState::ConnectingWifi,
            RunState::SyncingTime,
            RunState::Reporting,
            RunState::Complete,
        ]
        .map(RunState::flash_count);
        assert_eq!(counts, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_error_detail() {
        let AppError::Wifi(text) = AppError::wifi("timeout") else {
            panic!("wrong variant");
        };
        assert_eq!(text, "\"timeout\"");

        let AppError::TimeSync(text) = AppError::time_sync("x".repeat(100)) else {
            panic!("wrong variant");
        };
        assert!(text.len() <= 64);
    }

    #[test]
    fn test_network_error_message() {
        let error = AppError::network("Wi-Fi association lost");
        assert!(matches!(error, AppError::Network(_)));
        assert_eq!(
            alloc::format!("{error}"),
            "Network error: \"Wi-Fi association lost\""
        );
    }
}
