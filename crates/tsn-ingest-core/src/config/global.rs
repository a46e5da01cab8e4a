//! Run-wide execution settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings that apply to every branch of a run.
///
/// # Examples
///
/// ```
/// use tsn_ingest_core::config::GlobalConfig;
///
/// let config = GlobalConfig::default();
/// assert_eq!(config.max_concurrent_branches, None);
/// assert_eq!(config.call_timeout().as_secs(), 60);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Upper bound on branches running at the same time.
    ///
    /// Bounds outbound load against the destination store and the source
    /// providers. `None` runs every branch at once.
    #[serde(default)]
    pub max_concurrent_branches: Option<usize>,

    /// Timeout applied to every individual network call, in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_call_timeout_secs() -> u64 {
    60
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_concurrent_branches: None,
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl GlobalConfig {
    /// Create a GlobalConfig with a specific concurrency limit.
    pub fn with_concurrency(limit: usize) -> Self {
        Self {
            max_concurrent_branches: Some(limit),
            ..Self::default()
        }
    }

    /// Per-call timeout as a [`Duration`].
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Reject settings that would stall every branch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "global.call_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.max_concurrent_branches == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "global.max_concurrent_branches".to_string(),
                message: "must be greater than zero when set".to_string(),
            });
        }
        Ok(())
    }
}
