use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// The default statement timeout cannot be zero.
    #[error("`execution.default_timeout_secs` cannot be zero")]
    DefaultTimeoutZero,
    /// The retry policy must allow at least one attempt.
    #[error("`retry.max_attempts` cannot be zero")]
    MaxAttemptsZero,
    /// The backoff factor must not shrink the delay between attempts.
    #[error("`retry.backoff_factor` must be at least 1.0, got {0}")]
    BackoffFactorTooSmall(f32),
}
