//! Status LED patterns.
//!
//! The LED is the only way the board reports what it is doing when no debug
//! probe is attached. Every pattern is a number of equal-length toggles
//! followed by a dark pause, repeated as needed:
//!
//! | Pattern | Toggles | Toggle | Dark |
//! |---------|---------|--------|------|
//! | stage `n` | `2n` | 200 ms | 1 s |
//! | debug | 2 | 1 s | - |
//! | fault | 2 | 100 ms | - |
//! | resting | 2 | 2 s | - |
//! | resting after failure | 20 | 100 ms | 1 s |

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::debug;

use crate::app_state::RunState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    toggles: u32,
    toggle_ms: u32,
    dark_ms: u32,
}

impl Pattern {
    /// Debug jumper fitted: slow steady blink
    pub const DEBUG: Self = Self::new(2, 1_000, 0);
    /// Unrecoverable boot failure: rapid blink
    pub const FAULT: Self = Self::new(2, 100, 0);
    /// Idle after a clean cycle
    pub const RESTING: Self = Self::new(2, 2_000, 0);
    /// Idle after a cycle with failures
    pub const RESTING_AFTER_FAILURE: Self = Self::new(20, 100, 1_000);

    pub const fn new(toggles: u32, toggle_ms: u32, dark_ms: u32) -> Self {
        Self {
            toggles,
            toggle_ms,
            dark_ms,
        }
    }

    /// `count` short flashes then a pause.
    pub const fn flashes(count: u8) -> Self {
        Self::new(2 * count as u32, 200, 1_000)
    }

    /// Length of one repetition.
    pub const fn period_ms(&self) -> u32 {
        self.toggles * self.toggle_ms + self.dark_ms
    }
}

pub struct StatusLed<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> StatusLed<P, D>
where
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(pin: P, delay: D) -> Self {
        Self { pin, delay }
    }

    fn set(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        // Nothing useful can be done about a stuck LED
        if result.is_err() {
            debug!("Status LED write failed");
        }
    }

    /// Play one repetition of `pattern`, ending dark.
    pub async fn play(&mut self, pattern: Pattern) {
        for i in 0..pattern.toggles {
            self.set(i % 2 == 0);
            self.delay.delay_ms(pattern.toggle_ms).await;
        }
        self.set(false);
        if pattern.dark_ms > 0 {
            self.delay.delay_ms(pattern.dark_ms).await;
        }
    }

    /// `count` flashes to mark the start of a run stage.
    pub async fn flash(&mut self, count: u8) {
        self.play(Pattern::flashes(count)).await;
    }

    pub async fn stage(&mut self, state: RunState) {
        debug!("Stage: {:?}", state);
        self.flash(state.flash_count()).await;
    }

    /// Repeat `pattern` until at least `duration_ms` has passed.
    pub async fn run_for(&mut self, pattern: Pattern, duration_ms: u64) {
        let period = u64::from(pattern.period_ms().max(1));
        let mut elapsed = 0;
        while elapsed < duration_ms {
            self.play(pattern).await;
            elapsed += period;
        }
    }

    /// Rest between cycles with the pattern matching how the cycle went.
    pub async fn rest(&mut self, cycle_succeeded: bool, secs: u32) {
        let pattern = if cycle_succeeded {
            Pattern::RESTING
        } else {
            Pattern::RESTING_AFTER_FAILURE
        };
        self.run_for(pattern, u64::from(secs) * 1_000).await;
    }

    /// Repeat `pattern` until power is removed.
    pub async fn halt(&mut self, pattern: Pattern) -> ! {
        loop {
            self.play(pattern).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use core::convert::Infallible;
    use embassy_futures::block_on;

    #[derive(Default)]
    struct LoggedPin {
        states: Vec<bool>,
    }

    impl embedded_hal::digital::ErrorType for LoggedPin {
        type Error = Infallible;
    }

    impl OutputPin for LoggedPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.states.push(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.states.push(true);
            Ok(())
        }
    }

    #[derive(Default)]
    struct VirtualDelay {
        waits: Vec<u32>,
    }

    impl DelayNs for VirtualDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.waits.push(ns / 1_000_000);
        }

        async fn delay_ms(&mut self, ms: u32) {
            self.waits.push(ms);
        }
    }

    fn new_led() -> StatusLed<LoggedPin, VirtualDelay> {
        StatusLed::new(LoggedPin::default(), VirtualDelay::default())
    }

    #[test]
    fn test_flash_counts() {
        let mut led = new_led();
        block_on(led.flash(3));

        assert_eq!(led.pin.states, [true, false, true, false, true, false, false]);
        assert_eq!(led.delay.waits, [200, 200, 200, 200, 200, 200, 1_000]);
    }

    #[test]
    fn test_stage_flashes() {
        let mut led = new_led();
        block_on(led.stage(RunState::SyncingTime));
        assert_eq!(led.pin.states.iter().filter(|on| **on).count(), 3);

        let mut led = new_led();
        block_on(led.stage(RunState::Booting));
        assert_eq!(led.pin.states, [true, false, false]);
    }

    #[test]
    fn test_debug_pattern_toggles_every_second() {
        let mut led = new_led();
        block_on(led.run_for(Pattern::DEBUG, 4_000));

        assert_eq!(led.delay.waits, [1_000; 4]);
        assert_eq!(led.pin.states, [true, false, false, true, false, false]);
    }

    #[test]
    fn test_rest_covers_requested_time() {
        let mut led = new_led();
        block_on(led.rest(false, 9));

        let total: u32 = led.delay.waits.iter().sum();
        assert_eq!(total, 9_000);
        assert_eq!(Pattern::RESTING_AFTER_FAILURE.period_ms(), 3_000);

        let mut led = new_led();
        block_on(led.rest(true, 10));
        let total: u32 = led.delay.waits.iter().sum();
        assert_eq!(total, 12_000);
    }
}
