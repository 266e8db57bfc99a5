//! Bounded retry with exponential backoff and jitter
//!
//! The dispatcher itself makes a single attempt. Retrying is a separate,
//! opt-in policy: [`RetryPolicy::single_attempt`] is the default.
//!
//! Delay before retry `k` (1-based):
//!
//! ```text
//! capped = min(base_delay * 2^(k-1), max_delay)
//! delay  = capped * (1 - jitter * u),   u ∈ [0, 1)
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for webhook dispatch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
}

impl RetryPolicy {
    /// One attempt, no retries.
    #[must_use]
    pub const fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Exponential backoff with 50% jitter.
    ///
    /// `max_attempts` counts the first attempt and is at least 1.
    #[must_use]
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: 0.5,
        }
    }

    /// Set the jitter fraction, clamped to [0, 1].
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_nan() { 0.0 } else { jitter.clamp(0.0, 1.0) };
        self
    }

    /// Total attempts including the first
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Jitter fraction
    #[must_use]
    pub const fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Delay before retry number `retry` (1 = first retry).
    ///
    /// `jitter_sample` is a uniform draw from [0, 1); out-of-range samples
    /// are clamped.
    #[must_use]
    pub fn delay_for(&self, retry: u32, jitter_sample: f64) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);

        let sample = if jitter_sample.is_nan() {
            0.0
        } else {
            jitter_sample.clamp(0.0, 1.0)
        };
        capped.mul_f64(1.0 - self.jitter * sample)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single_attempt()
    }
}
