use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for infrastructure failures, such as a rejected status write.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts before giving up.
    pub max_attempts: u32,
    /// Initial delay, in milliseconds, before the first retry.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries.
    pub max_delay_ms: u64,
    /// Exponential backoff multiplier applied to the delay after each attempt.
    pub backoff_factor: f32,
}

impl RetryConfig {
    /// Returns the delay before retry number `attempt`, counting from zero.
    ///
    /// The delay grows by `backoff_factor` per attempt and is capped at
    /// `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = f64::from(self.backoff_factor).powi(attempt.min(i32::MAX as u32) as i32);
        let delay_ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);

        Duration::from_millis(delay_ms as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_is_capped() {
        let retry = RetryConfig::default();

        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(1_000));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(4_000));
        assert_eq!(retry.delay_for_attempt(10), Duration::from_millis(10_000));
    }
}
