use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Landing-zone cleaner configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CleanerConfig {
    /// Whether the cleaner runs at all.
    #[serde(default)]
    pub enable: bool,
    /// Seconds between cleaner passes in service mode.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Source files must be at least this many days old before deletion.
    #[serde(default = "default_age_days")]
    pub age_days: u32,
    /// The cleaner's target-timestamp cache is cleared after this many
    /// verified records, bounding memory on large passes.
    #[serde(default = "default_cache_offsets_size")]
    pub cache_offsets_size: usize,
}

impl CleanerConfig {
    /// Default interval between cleaner passes, in seconds.
    pub const DEFAULT_INTERVAL_SECS: u64 = 1260;

    /// Default minimum age before deletion, in days.
    pub const DEFAULT_AGE_DAYS: u32 = 7;

    /// Default number of verified records between cache clears.
    pub const DEFAULT_CACHE_OFFSETS_SIZE: usize = 500_000;

    /// Validates cleaner configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enable && self.interval_secs == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "cleaner.interval_secs".to_string(),
                constraint: "must be greater than 0 when the cleaner is enabled".to_string(),
            });
        }

        if self.cache_offsets_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "cleaner.cache_offsets_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            enable: false,
            interval_secs: default_interval_secs(),
            age_days: default_age_days(),
            cache_offsets_size: default_cache_offsets_size(),
        }
    }
}

fn default_interval_secs() -> u64 {
    CleanerConfig::DEFAULT_INTERVAL_SECS
}

fn default_age_days() -> u32 {
    CleanerConfig::DEFAULT_AGE_DAYS
}

fn default_cache_offsets_size() -> usize {
    CleanerConfig::DEFAULT_CACHE_OFFSETS_SIZE
}
