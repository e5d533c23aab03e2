use serde::{Deserialize, Serialize};

use crate::shared::{ExecutionConfig, RetryConfig, ValidationError};

/// Complete configuration for the operator process.
///
/// Typically loaded from configuration files at startup with
/// [`crate::load_config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OperatorConfig {
    /// Name of this operator instance, injected into production logs.
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    /// Namespace to watch. When `None`, queries in all namespaces are reconciled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_namespace: Option<String>,
    /// Maximum number of reconciliation passes running at once. `0` means unbounded.
    #[serde(default)]
    pub max_concurrent_reconciles: u16,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Whether a failure to reach the database is requeued with backoff instead
    /// of waiting for the next change to the query.
    #[serde(default)]
    pub retry_connection_failures: bool,
}

impl OperatorConfig {
    /// Validates the operator configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.execution.default_timeout_secs == 0 {
            return Err(ValidationError::DefaultTimeoutZero);
        }

        if self.retry.max_attempts == 0 {
            return Err(ValidationError::MaxAttemptsZero);
        }

        if self.retry.backoff_factor < 1.0 {
            return Err(ValidationError::BackoffFactorTooSmall(
                self.retry.backoff_factor,
            ));
        }

        Ok(())
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            watch_namespace: None,
            max_concurrent_reconciles: 0,
            execution: ExecutionConfig::default(),
            retry: RetryConfig::default(),
            retry_connection_failures: false,
        }
    }
}

fn default_instance_name() -> String {
    "kubequery".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(OperatorConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = OperatorConfig::default();
        config.execution.default_timeout_secs = 0;

        assert_eq!(config.validate(), Err(ValidationError::DefaultTimeoutZero));
    }

    #[test]
    fn shrinking_backoff_is_rejected() {
        let mut config = OperatorConfig::default();
        config.retry.backoff_factor = 0.5;

        assert_eq!(
            config.validate(),
            Err(ValidationError::BackoffFactorTooSmall(0.5))
        );
    }
}
