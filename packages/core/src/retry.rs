//! Exponential backoff between retry attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff policy: `min(2^attempts * base, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Multiplier for the exponential term, in milliseconds.
    pub base_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            cap_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base_ms: base.as_millis() as u64,
            cap_ms: cap.as_millis() as u64,
        }
    }

    /// Delay before re-admitting a job that has made `attempts` attempts.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        Duration::from_millis(factor.saturating_mul(self.base_ms).min(self.cap_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_doubles_until_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(16_000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(12), Duration::from_millis(30_000));
    }

    #[test]
    fn huge_attempt_counts_saturate_at_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(64), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn matches_closed_form_for_every_small_attempt() {
        let policy = RetryPolicy::default();
        for k in 0..20u32 {
            let expected = (2u64.pow(k) * 1_000).min(30_000);
            assert_eq!(policy.delay_for(k), Duration::from_millis(expected), "attempt {k}");
        }
    }

    #[test]
    fn custom_policy_uses_its_own_bounds() {
        let policy = RetryPolicy::new(Duration::from_millis(5), Duration::from_millis(12));
        assert_eq!(policy.delay_for(0), Duration::from_millis(5));
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(12));
    }
}
