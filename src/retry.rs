//! Exponential backoff with optional jitter, bounded by a retry budget.

use chrono::Duration;
use rand::Rng;

use crate::config::SchedulerConfig;
use crate::domain::WorkItem;

/// Upper bound on any computed delay (about a century).
const MAX_DELAY_SECONDS: u64 = 100 * 365 * 24 * 3600;

/// Effective retry settings for one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_seconds: u64,
    pub backoff_jitter_seconds: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_seconds: u64) -> Self {
        Self {
            max_retries,
            backoff_base_seconds,
            backoff_jitter_seconds: 0,
        }
    }

    pub fn with_jitter(mut self, jitter_seconds: u64) -> Self {
        self.backoff_jitter_seconds = jitter_seconds;
        self
    }

    /// Global defaults overridden by whatever the work item sets.
    pub fn effective(defaults: &SchedulerConfig, item: &WorkItem) -> Self {
        Self {
            max_retries: item.max_retries.unwrap_or(defaults.max_retries),
            backoff_base_seconds: item.backoff_base_seconds.unwrap_or(defaults.backoff_base_seconds),
            backoff_jitter_seconds: item
                .backoff_jitter_seconds
                .unwrap_or(defaults.backoff_jitter_seconds),
        }
    }

    /// Deterministic part of the delay: `base * 2^exponent`, saturating.
    pub fn base_delay(&self, exponent: u32) -> Duration {
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let secs = self.backoff_base_seconds.saturating_mul(factor).min(MAX_DELAY_SECONDS);
        Duration::seconds(secs as i64)
    }

    /// Delay before retry number `failure_count` (1-based), or `None` once the
    /// budget is exhausted.
    pub fn delay_for<R: Rng + ?Sized>(&self, failure_count: u32, rng: &mut R) -> Option<Duration> {
        if failure_count == 0 || failure_count > self.max_retries {
            return None;
        }
        Some(self.base_delay(failure_count - 1) + self.jitter(rng))
    }

    /// Uniform sample in `[0, jitter)`, millisecond resolution.
    pub fn jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.backoff_jitter_seconds == 0 {
            return Duration::zero();
        }
        let max_ms = self.backoff_jitter_seconds.saturating_mul(1000);
        Duration::milliseconds(rng.random_range(0..max_ms) as i64)
    }
}
