//! Classified-error retry policy
//!
//! Failures arriving from the remote transport carry an
//! [`ErrorClass`]; the policy decides whether a class is worth retrying
//! and how long to wait before the next attempt. Delays grow
//! exponentially from a base, are capped, and carry a random jitter
//! fraction so a fleet of clients recovering from the same outage does
//! not retry in lockstep.

use std::time::Duration;

use rand::Rng;

use replicore_core::config::RetryConfig;
use replicore_core::ports::ErrorClass;

/// Decides retry eligibility and backoff delays for failed publications
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Total attempt ceiling, the first try included
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Whether failures of this class are worth retrying at all
    #[must_use]
    pub fn is_retryable(&self, class: ErrorClass) -> bool {
        self.config.retryable.contains(&class)
    }

    /// Delay before the attempt following `attempt` failed tries, or `None`
    /// when the attempt budget is exhausted
    ///
    /// `attempt` is 1-based: after the first failed try, call
    /// `next_delay(1)`. With `max_attempts = 3` the delays returned are for
    /// attempts 2 and 3; `next_delay(3)` is `None`.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            return None;
        }

        let exp = attempt.saturating_sub(1).min(32);
        let raw = self
            .config
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.config.max_delay_ms);

        let jitter_cap = (raw as f64 * self.config.jitter_factor) as u64;
        let jitter = if jitter_cap > 0 {
            rand::thread_rng().gen_range(0..=jitter_cap)
        } else {
            0
        };

        Some(Duration::from_millis(raw + jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, base_ms: u64, max_ms: u64, jitter: f64) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_delay_ms: base_ms,
            max_delay_ms: max_ms,
            jitter_factor: jitter,
            retryable: vec![ErrorClass::Network, ErrorClass::Throttling],
        })
    }

    #[test]
    fn test_retryable_classes_from_config() {
        let policy = policy(3, 100, 1_000, 0.0);
        assert!(policy.is_retryable(ErrorClass::Network));
        assert!(policy.is_retryable(ErrorClass::Throttling));
        assert!(!policy.is_retryable(ErrorClass::BadRequest));
        assert!(!policy.is_retryable(ErrorClass::Unauthorized));
    }

    #[test]
    fn test_delays_double_without_jitter() {
        let policy = policy(4, 100, 10_000, 0.0);
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(400)));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = policy(10, 1_000, 2_500, 0.0);
        assert_eq!(policy.next_delay(5), Some(Duration::from_millis(2_500)));
    }

    #[test]
    fn test_attempt_budget_exhausts() {
        let policy = policy(3, 100, 1_000, 0.0);
        assert!(policy.next_delay(3).is_none());
        assert!(policy.next_delay(7).is_none());
    }

    #[test]
    fn test_jitter_stays_within_fraction() {
        let policy = policy(5, 1_000, 60_000, 0.25);
        for _ in 0..50 {
            let delay = policy.next_delay(1).unwrap().as_millis() as u64;
            assert!((1_000..=1_250).contains(&delay));
        }
    }
}
