//! Wall-clock time for readings.
//!
//! Readings carry a UTC [`Timestamp`]; reports show it as a [`LocalTime`] at
//! the configured fixed offset. The board learns the time over SNTP, see
//! [`ntp`].

use core::fmt;

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch, UTC
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_unix(secs: i64) -> Self {
        Self(secs)
    }

    pub const fn as_unix(self) -> i64 {
        self.0
    }

    pub const fn add_secs(self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Calendar time at a fixed offset from UTC.
    pub fn to_local(self, utc_offset_hours: i8) -> LocalTime {
        let offset = FixedOffset::east_opt(i32::from(utc_offset_hours) * 3600)
            .unwrap_or_else(|| Utc.fix());
        let utc: DateTime<Utc> = DateTime::from_timestamp(self.0, 0).unwrap_or_default();
        let local = utc.with_timezone(&offset);

        LocalTime {
            year: local.year(),
            month: local.month() as u8,
            day: local.day() as u8,
            hour: local.hour() as u8,
            minute: local.minute() as u8,
            second: local.second() as u8,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.to_local(0);
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            t.year, t.month, t.day, t.hour, t.minute, t.second
        )
    }
}

/// Broken-down calendar time.
///
/// Displays as `YYYY-MM-DD-HH-MM-SS`, the form used in report file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}-{:02}-{:02}-{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Source of the current time
pub trait Clock {
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Adapts a [`Clock`] to stamp files written through `embedded-sdmmc`.
pub struct ClockTimeSource<C> {
    clock: C,
    utc_offset_hours: i8,
}

impl<C: Clock> ClockTimeSource<C> {
    pub const fn new(clock: C, utc_offset_hours: i8) -> Self {
        Self {
            clock,
            utc_offset_hours,
        }
    }
}

impl<C: Clock> embedded_sdmmc::TimeSource for ClockTimeSource<C> {
    fn get_timestamp(&self) -> embedded_sdmmc::Timestamp {
        let t = self.clock.now().to_local(self.utc_offset_hours);
        embedded_sdmmc::Timestamp {
            year_since_1970: (t.year - 1970).clamp(0, 255) as u8,
            zero_indexed_month: t.month.saturating_sub(1),
            zero_indexed_day: t.day.saturating_sub(1),
            hours: t.hour,
            minutes: t.minute,
            seconds: t.second,
        }
    }
}

/// Simple Network Time Protocol client packets.
pub mod ntp {
    use thiserror_no_std::Error;

    use super::Timestamp;

    pub const PORT: u16 = 123;
    pub const PACKET_LEN: usize = 48;

    /// Seconds between the NTP era start (1900) and the Unix epoch
    pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

    const TRANSMIT_OFFSET: usize = 40;
    const MODE_SERVER: u8 = 4;

    #[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
    pub enum NtpError {
        #[error("reply is {0} bytes, expected 48")]
        Truncated(usize),
        #[error("reply is not from a server (mode {0})")]
        NotServerReply(u8),
        #[error("server is not synchronised")]
        Unsynchronised,
    }

    /// Client request: leap indicator 0, version 4, mode 3.
    pub const fn request_packet() -> [u8; PACKET_LEN] {
        let mut packet = [0u8; PACKET_LEN];
        packet[0] = 0b0010_0011;
        packet
    }

    /// Extract the server transmit time from a reply.
    pub fn parse_transmit_time(packet: &[u8]) -> Result<Timestamp, NtpError> {
        if packet.len() < PACKET_LEN {
            return Err(NtpError::Truncated(packet.len()));
        }

        let mode = packet[0] & 0b111;
        if mode != MODE_SERVER {
            return Err(NtpError::NotServerReply(mode));
        }

        // stratum 0 is a kiss-o'-death reply
        if packet[1] == 0 {
            return Err(NtpError::Unsynchronised);
        }

        let mut secs = [0u8; 4];
        secs.copy_from_slice(&packet[TRANSMIT_OFFSET..TRANSMIT_OFFSET + 4]);
        let mut ntp_secs = u64::from(u32::from_be_bytes(secs));
        if ntp_secs == 0 {
            return Err(NtpError::Unsynchronised);
        }
        // era 1 starts in 2036
        if ntp_secs < NTP_UNIX_OFFSET {
            ntp_secs += 1 << 32;
        }

        Ok(Timestamp::from_unix((ntp_secs - NTP_UNIX_OFFSET) as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    // Reply captured from a public pool server
    const SERVER_REPLY: [u8; 48] = [
        28, 2, 3, 232, 0, 0, 2, 90, 0, 0, 10, 244, 199, 102, 46, 70, 235, 158, 133, 133, 1, 115,
        59, 109, 0, 0, 0, 0, 0, 0, 0, 0, 235, 158, 140, 100, 167, 122, 247, 13, 235, 158, 140, 100,
        167, 130, 119, 246,
    ];

    #[test]
    fn test_local_time_formatting() {
        let ts = Timestamp::from_unix(1_700_000_000);
        assert_eq!(ts.to_local(0).to_string(), "2023-11-14-22-13-20");
        assert_eq!(ts.to_local(-5).to_string(), "2023-11-14-17-13-20");
        assert_eq!(ts.to_string(), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_offset_crosses_midnight() {
        let ts = Timestamp::from_unix(1_700_000_000).add_secs(3 * 3600);
        let local = ts.to_local(2);
        assert_eq!((local.year, local.month, local.day, local.hour), (2023, 11, 15, 3));
    }

    #[test]
    fn test_request_packet_header() {
        let packet = ntp::request_packet();
        assert_eq!(packet.len(), ntp::PACKET_LEN);
        assert_eq!(packet[0] >> 6, 0, "leap indicator");
        assert_eq!((packet[0] >> 3) & 0b111, 4, "version");
        assert_eq!(packet[0] & 0b111, 3, "client mode");
        assert!(packet[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_parse_server_reply() {
        let ts = ntp::parse_transmit_time(&SERVER_REPLY).unwrap();
        assert_eq!(ts.as_unix(), 1_744_047_588);
        assert_eq!(ts.to_local(-5).to_string(), "2025-04-07-12-39-48");
    }

    #[test]
    fn test_rejects_bad_replies() {
        assert_eq!(
            ntp::parse_transmit_time(&SERVER_REPLY[..20]),
            Err(ntp::NtpError::Truncated(20))
        );

        let mut client_echo = SERVER_REPLY;
        client_echo[0] = 0b0010_0011;
        assert_eq!(
            ntp::parse_transmit_time(&client_echo),
            Err(ntp::NtpError::NotServerReply(3))
        );

        let mut kiss = SERVER_REPLY;
        kiss[1] = 0;
        assert_eq!(
            ntp::parse_transmit_time(&kiss),
            Err(ntp::NtpError::Unsynchronised)
        );
    }

    #[test]
    fn test_sd_card_time_source() {
        use embedded_sdmmc::TimeSource;

        struct Fixed;
        impl Clock for Fixed {
            fn now(&self) -> Timestamp {
                Timestamp::from_unix(1_700_000_000)
            }
        }

        let stamp = ClockTimeSource::new(Fixed, -5).get_timestamp();
        assert_eq!(stamp.year_since_1970, 53);
        assert_eq!(stamp.zero_indexed_month, 10);
        assert_eq!(stamp.zero_indexed_day, 13);
        assert_eq!((stamp.hours, stamp.minutes, stamp.seconds), (17, 13, 20));
    }
}
