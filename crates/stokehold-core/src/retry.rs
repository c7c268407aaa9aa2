//! Retry policy for failed refresh attempts

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff policy applied inside the refresh routine
///
/// `max_retries` counts retries after the initial attempt, so a policy with
/// `max_retries = 3` allows up to four fetch invocations per refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries, useful for tests and one-shot sources
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0 = first retry):
    /// `min(base * multiplier^attempt, max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt as i32);
        let ms = (self.base_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn delay_is_capped_at_max() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay_ms: 1_000,
            backoff_multiplier: 10.0,
            max_delay_ms: 5_000,
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(5_000));
        assert_eq!(policy.delay_for(9), Duration::from_millis(5_000));
    }

    #[test]
    fn sub_one_multiplier_never_shrinks_the_delay() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay_ms: 100,
            backoff_multiplier: 0.5,
            max_delay_ms: 5_000,
        };

        assert_eq!(policy.delay_for(3), Duration::from_millis(100));
    }
}
