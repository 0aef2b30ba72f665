//! Randomized request pacing.
//!
//! Each worker owns a [`Pacer`]; there is no global rate limit. The same
//! [`DelayRange`] type drives the detail fetcher's retry backoff.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Uniform delay range in milliseconds (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Always zero. Useful for tests and for disabling pacing.
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Draw a delay uniformly from the range.
    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        if lo == hi {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }

    /// Sleep for a freshly sampled delay.
    pub async fn sleep(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Per-worker pacing between successive requests.
#[derive(Debug)]
pub struct Pacer {
    range: DelayRange,
    /// When the previous request finished.
    last_finished: Option<Instant>,
    /// Delay drawn for the gap before the next request.
    next_delay: Duration,
}

impl Pacer {
    pub fn new(range: DelayRange) -> Self {
        Self {
            range,
            last_finished: None,
            next_delay: Duration::ZERO,
        }
    }

    /// Time until the next request may start.
    pub fn time_until_ready(&self) -> Duration {
        match self.last_finished {
            Some(last) => self.next_delay.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Wait until the next request may start. The first request never waits.
    pub async fn acquire(&self) {
        let wait = self.time_until_ready();
        if wait > Duration::ZERO {
            debug!("Pacing: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Record that a request finished and draw the next gap.
    pub fn finish(&mut self) {
        self.last_finished = Some(Instant::now());
        self.next_delay = self.range.sample();
    }
}
