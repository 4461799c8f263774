use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Redis coordination settings for multi-process deployments.
///
/// When absent from the configuration, topic locks fall back to an in-process
/// implementation, which is correct for a single restructurer instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoordinationConfig {
    /// Redis host.
    pub host: String,
    /// Redis port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Optional username.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,
    /// Key prefix for per-topic locks.
    #[serde(default = "default_lock_prefix")]
    pub lock_prefix: String,
    /// Lock TTL in seconds. A pass over one topic must finish well within
    /// this window; `workers.max_files_per_topic` is what bounds it.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

impl CoordinationConfig {
    /// Default Redis port.
    pub const DEFAULT_PORT: u16 = 6379;

    /// Default lock key prefix.
    pub const DEFAULT_LOCK_PREFIX: &'static str = "restructure/lock";

    /// Default lock TTL, in seconds.
    pub const DEFAULT_LOCK_TTL_SECS: u64 = 300;

    /// Validates coordination configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "coordination.host".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        if self.lock_ttl_secs == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "coordination.lock_ttl_secs".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn default_port() -> u16 {
    CoordinationConfig::DEFAULT_PORT
}

fn default_lock_prefix() -> String {
    CoordinationConfig::DEFAULT_LOCK_PREFIX.to_string()
}

fn default_lock_ttl_secs() -> u64 {
    CoordinationConfig::DEFAULT_LOCK_TTL_SECS
}
