//! Reporting sinks for readings.
//!
//! A [`ReportSink`] receives every reading exactly once per cycle. Sinks are
//! composed: [`Retrying`] applies the [`RetryPolicy`] to a flaky transport,
//! [`Tee`] fans a reading out to two destinations.
//!
//! ## Failure policy
//!
//! Transport failures are retried with exponential backoff up to
//! `max_retries` times. After that the reading is dropped and the failure is
//! surfaced as a warning; readings are never queued for a later cycle.

pub mod http;
pub mod post;
pub mod record;
pub mod sd_card;

use embedded_hal_async::delay::DelayNs;
use log::{info, warn};
use thiserror_no_std::Error;

use crate::reading::Reading;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("network failure: {0}")]
    Network(&'static str),
    #[error("endpoint answered with HTTP status {status}")]
    Rejected { status: u16 },
    #[error("endpoint sent a malformed response")]
    MalformedResponse,
    #[error("local record failure: {0}")]
    Storage(&'static str),
    #[error("reading could not be encoded")]
    Encode,
}

impl ReportError {
    /// Whether another attempt could plausibly succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::MalformedResponse => true,
            Self::Rejected { status } => *status >= 500 || *status == 429,
            Self::Storage(_) | Self::Encode => false,
        }
    }
}

/// Destination for readings
pub trait ReportSink {
    fn publish(&mut self, reading: &Reading) -> impl Future<Output = Result<(), ReportError>>;
}

impl<S: ReportSink + ?Sized> ReportSink for &mut S {
    async fn publish(&mut self, reading: &Reading) -> Result<(), ReportError> {
        (**self).publish(reading).await
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one (0 = try once)
    pub max_retries: u32,
    /// Wait before the first retry
    pub initial_delay_ms: u32,
    /// Factor applied to the wait after each retry
    pub multiplier: u32,
    /// Upper bound on a single wait
    pub max_delay_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            multiplier: 2,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based).
    pub fn delay_ms(&self, retry: u32) -> u32 {
        let mut delay = self.initial_delay_ms;
        for _ in 1..retry {
            delay = delay.saturating_mul(self.multiplier);
            if delay >= self.max_delay_ms {
                break;
            }
        }
        delay.min(self.max_delay_ms)
    }
}

/// Applies a [`RetryPolicy`] to another sink.
pub struct Retrying<S, D> {
    inner: S,
    delay: D,
    policy: RetryPolicy,
}

impl<S, D> Retrying<S, D> {
    pub const fn new(inner: S, delay: D, policy: RetryPolicy) -> Self {
        Self {
            inner,
            delay,
            policy,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S, D> ReportSink for Retrying<S, D>
where
    S: ReportSink,
    D: DelayNs,
{
    async fn publish(&mut self, reading: &Reading) -> Result<(), ReportError> {
        let mut retry = 0;
        loop {
            match self.inner.publish(reading).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && retry < self.policy.max_retries => {
                    retry += 1;
                    let wait = self.policy.delay_ms(retry);
                    warn!(
                        "{}: publish failed ({}), retry {}/{} in {} ms",
                        reading.sensor, e, retry, self.policy.max_retries, wait
                    );
                    self.delay.delay_ms(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Publishes to both sinks; the first failure is returned after both were tried.
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A, B> Tee<A, B> {
    pub const fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A, B> ReportSink for Tee<A, B>
where
    A: ReportSink,
    B: ReportSink,
{
    async fn publish(&mut self, reading: &Reading) -> Result<(), ReportError> {
        let first = self.first.publish(reading).await;
        let second = self.second.publish(reading).await;
        first.and(second)
    }
}

/// Writes each reading to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    async fn publish(&mut self, reading: &Reading) -> Result<(), ReportError> {
        info!("Reading: {}", reading);
        Ok(())
    }
}
