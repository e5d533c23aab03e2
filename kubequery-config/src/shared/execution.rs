use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout applied when a query declares none.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default time granted to the server-side cancel request after a timeout.
const DEFAULT_CANCEL_GRACE_MS: u64 = 500;

/// Settings governing a single statement execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionConfig {
    /// Timeout in seconds covering connect and execute, used when the declared
    /// query has no `options.timeoutSeconds`.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Upper bound in milliseconds on the cancel request sent to the server when
    /// the timeout expires mid-statement.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

impl ExecutionConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            cancel_grace_ms: DEFAULT_CANCEL_GRACE_MS,
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_cancel_grace_ms() -> u64 {
    DEFAULT_CANCEL_GRACE_MS
}
