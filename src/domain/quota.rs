//! Per-project usage quota and its consume-and-check rule.
//!
//! The arithmetic lives here so it can be tested without a store; the
//! enforcer in `crate::quota` wraps it in a per-project transaction.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of a quota window.
pub const QUOTA_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageQuota {
    pub id: i64,
    pub project_id: i64,
    /// 0 means unlimited
    pub max_runs_per_day: u32,
    pub runs_today: u32,
    pub window_start: DateTime<Utc>,
    /// Optimistic-lock counter, bumped on every write
    pub version: i64,
}

/// Remaining budget after a consume attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Remaining {
    Unlimited,
    Runs(u32),
}

impl Remaining {
    /// Wire representation: -1 for unlimited.
    pub fn as_i64(&self) -> i64 {
        match self {
            Remaining::Unlimited => -1,
            Remaining::Runs(n) => *n as i64,
        }
    }
}

/// Outcome of [`UsageQuota::try_consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: Remaining,
    /// The window was reset as part of this call
    pub window_reset: bool,
}

impl UsageQuota {
    pub fn is_unlimited(&self) -> bool {
        self.max_runs_per_day == 0
    }

    /// Whether a full window has passed since `window_start`.
    pub fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        now - self.window_start >= Duration::hours(QUOTA_WINDOW_HOURS)
    }

    /// Start a new window if the current one has elapsed. Returns true on reset.
    pub fn reset_if_elapsed(&mut self, now: DateTime<Utc>) -> bool {
        if self.window_elapsed(now) {
            self.window_start = now;
            self.runs_today = 0;
            true
        } else {
            false
        }
    }

    /// Reset the window if due, then admit one run if budget allows.
    ///
    /// The reset sticks even when the run is denied. A denial never increments.
    pub fn try_consume(&mut self, now: DateTime<Utc>) -> QuotaDecision {
        let window_reset = self.reset_if_elapsed(now);

        if self.is_unlimited() {
            self.runs_today = self.runs_today.saturating_add(1);
            return QuotaDecision {
                allowed: true,
                remaining: Remaining::Unlimited,
                window_reset,
            };
        }

        if self.runs_today >= self.max_runs_per_day {
            return QuotaDecision {
                allowed: false,
                remaining: Remaining::Runs(0),
                window_reset,
            };
        }

        self.runs_today += 1;
        QuotaDecision {
            allowed: true,
            remaining: Remaining::Runs(self.max_runs_per_day - self.runs_today),
            window_reset,
        }
    }
}
