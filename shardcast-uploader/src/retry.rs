//! Retry policy for the placement poll

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the wait grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same interval before every attempt
    #[default]
    Fixed,
    /// Interval multiplied by the attempt number
    Linear,
}

/// Bounded retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,
    /// Base wait before each attempt
    pub interval: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval: Duration::from_secs(6),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    /// Fixed-interval policy
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            backoff: Backoff::Fixed,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Wait before attempt number `attempt` (1-based)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Linear => self.interval.saturating_mul(attempt.max(1)),
        }
    }

    /// Lower bound on the time spent waiting when every attempt is used
    pub fn total_wait(&self) -> Duration {
        (1..=self.max_attempts)
            .map(|attempt| self.delay_before(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}
