//! Per-operation retry policy and dead-letter records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fieldhouse_core::QueuedOperation;
use serde::{Deserialize, Serialize};

/// Bounded exponential backoff.
///
/// The delay before retry `n` (1-based) is `min(base_delay * 2^(n-1), max_delay)`.
/// The default makes a single attempt, i.e. no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Policy retrying up to `max_attempts` times in total.
    #[must_use]
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delays(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    #[must_use]
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(63);
        let factor = 1_u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// An operation that failed every attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub operation: QueuedOperation,
    /// Error text of the last attempt.
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn default_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.effective_attempts(), 1);
        assert_eq!(RetryPolicy::attempts(0).effective_attempts(), 1);
    }

    #[test]
    fn delays_double_until_capped() {
        let policy = RetryPolicy::attempts(6).with_delays(100, 1_000);
        let delays: Vec<u64> = (1..=6)
            .map(|n| u64::try_from(policy.delay(n).as_millis()).unwrap())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn deserializes_with_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 3}"#).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 100);
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_cap(
            base in 0_u64..10_000,
            cap in 0_u64..100_000,
            retry in 0_u32..200,
        ) {
            let policy = RetryPolicy::attempts(3).with_delays(base, cap);
            prop_assert!(policy.delay(retry).as_millis() <= u128::from(cap));
        }

        #[test]
        fn delay_is_monotonic(base in 1_u64..1_000, retry in 1_u32..40) {
            let policy = RetryPolicy::attempts(3).with_delays(base, 60_000);
            prop_assert!(policy.delay(retry) <= policy.delay(retry + 1));
        }
    }
}
