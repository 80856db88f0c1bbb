//! Exponential reconnect backoff with a ceiling.

use std::time::Duration;

use crate::constants;

/// Reconnect delay policy.
///
/// `delay(n) = min(base * 2^n, max)`, computed with saturating arithmetic so
/// large attempt counts pin to `max` instead of overflowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            constants::RECONNECT_BASE_DELAY,
            constants::RECONNECT_MAX_DELAY,
            constants::RECONNECT_MAX_ATTEMPTS,
        )
    }
}

impl Backoff {
    /// Create a policy. A `max` below `base` is raised to `base`.
    #[must_use]
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            max_attempts,
        }
    }

    /// Delay before the retry that follows `attempt` consecutive failures.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Attempt ceiling.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Base delay.
    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay ceiling.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }
}
