//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::OriginConfig;

/// How many times, and how patiently, a failed transport is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &OriginConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt following `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }

    /// Longest a fetch can take when every attempt runs to `per_attempt`,
    /// counting each backoff at its full jitter.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        let backoff_ms: u64 = (1..attempts)
            .map(|attempt| {
                let capped = self
                    .base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt - 1))
                    .min(self.max_delay_ms);
                capped + capped / 10
            })
            .fold(0u64, u64::saturating_add);
        per_attempt
            .saturating_mul(attempts)
            .saturating_add(Duration::from_millis(backoff_ms))
    }
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Jitter: up to 10% of the delay
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}
