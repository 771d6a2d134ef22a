//! Central retry policy consumed by every provider call site.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for transient provider failures.
///
/// One instance is shared by all call sites so backoff behavior stays
/// uniform across providers. Delays grow exponentially from `base_delay`
/// with up to `jitter_frac` random jitter added.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per provider call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Fraction of the computed delay added as random jitter (0.0 to 1.0).
    pub jitter_frac: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            jitter_frac: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            jitter_frac: 0.0,
        }
    }

    /// Whether another attempt is allowed after `attempt` completed attempts.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait before retry number `attempt` (1-based), with jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self.base_delay.as_secs_f64() * f64::from(1u32 << exp);
        let jitter = if self.jitter_frac > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter_frac) * base
        } else {
            0.0
        };
        Duration::from_secs_f64(base + jitter)
    }
}
