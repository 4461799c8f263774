use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Service-mode configuration.
///
/// When enabled, the restructurer keeps running and repeats processing passes
/// on a fixed interval instead of exiting after a single pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServiceConfig {
    /// Whether to run as a long-lived service.
    #[serde(default)]
    pub enable: bool,
    /// Seconds to sleep between restructure passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl ServiceConfig {
    /// Default interval between restructure passes, in seconds.
    pub const DEFAULT_INTERVAL_SECS: u64 = 300;

    /// Validates service configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enable && self.interval_secs == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "service.interval_secs".to_string(),
                constraint: "must be greater than 0 when service mode is enabled".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enable: false,
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    ServiceConfig::DEFAULT_INTERVAL_SECS
}
