use embassy_time::Instant;
use tempsense_core::time::{Clock, Timestamp};

/// Wall clock anchored to one SNTP reply and advanced by the monotonic timer.
#[derive(Debug, Clone, Copy)]
pub struct SyncedClock {
    synced_at: Instant,
    unix_at_sync: Timestamp,
}

impl SyncedClock {
    pub fn new(unix_at_sync: Timestamp) -> Self {
        Self {
            synced_at: Instant::now(),
            unix_at_sync,
        }
    }
}

impl Clock for SyncedClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.synced_at.elapsed().as_secs();
        self.unix_at_sync.add_secs(i64::try_from(elapsed).unwrap_or(i64::MAX))
    }
}
