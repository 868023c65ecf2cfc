//! Send-retry policy: an explicit policy object injected into the engine,
//! separate from the connector's own lower-level retry of raw I/O.

use commandeer_core::EngineConfig;
use std::time::Duration;

/// Retry budget and backoff for a single command send. Retries apply only to
/// errors the connector classifies as transient.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (so `max_retries = 2` allows three
    /// attempts in total).
    pub max_retries: u32,
    /// Linear backoff step: the n-th retry waits `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }

    /// Whether another attempt is allowed after `attempts` tries.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }

    /// Delay before the `retry`-th retry (1-based).
    pub fn delay_before(&self, retry: u32) -> Duration {
        self.backoff * retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_allows_three_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(200),
        };
        assert_eq!(policy.delay_before(1), Duration::from_millis(200));
        assert_eq!(policy.delay_before(2), Duration::from_millis(400));
        assert_eq!(policy.delay_before(3), Duration::from_millis(600));
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        let policy = RetryPolicy {
            max_retries: 0,
            backoff: Duration::ZERO,
        };
        assert!(!policy.allows_retry(1));
    }
}
