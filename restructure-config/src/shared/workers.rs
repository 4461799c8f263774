use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Worker pool and writer cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Number of topics processed concurrently.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Maximum number of output writers kept open per worker.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Maximum number of source files processed per topic in one pass.
    #[serde(default = "default_max_files_per_topic")]
    pub max_files_per_topic: usize,
    /// Source files modified within this many seconds are skipped, so a pass
    /// never races a sink that is still writing them.
    #[serde(default = "default_min_file_age_secs")]
    pub min_file_age_secs: u64,
    /// Directory for staged output files and accounting scratch space.
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
}

impl WorkerConfig {
    /// Default number of concurrent topic workers.
    pub const DEFAULT_NUM_WORKERS: usize = 1;

    /// Default writer cache capacity.
    pub const DEFAULT_CACHE_SIZE: usize = 100;

    /// Default per-topic file batch bound.
    pub const DEFAULT_MAX_FILES_PER_TOPIC: usize = 500;

    /// Default minimum source file age, in seconds.
    pub const DEFAULT_MIN_FILE_AGE_SECS: u64 = 60;

    /// Validates worker configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.num_workers == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "workers.num_workers".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.cache_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "workers.cache_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.max_files_per_topic == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "workers.max_files_per_topic".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            cache_size: default_cache_size(),
            max_files_per_topic: default_max_files_per_topic(),
            min_file_age_secs: default_min_file_age_secs(),
            tmp_dir: default_tmp_dir(),
        }
    }
}

fn default_num_workers() -> usize {
    WorkerConfig::DEFAULT_NUM_WORKERS
}

fn default_cache_size() -> usize {
    WorkerConfig::DEFAULT_CACHE_SIZE
}

fn default_max_files_per_topic() -> usize {
    WorkerConfig::DEFAULT_MAX_FILES_PER_TOPIC
}

fn default_min_file_age_secs() -> u64 {
    WorkerConfig::DEFAULT_MIN_FILE_AGE_SECS
}

fn default_tmp_dir() -> PathBuf {
    std::env::temp_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(WorkerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_cache_size_is_rejected() {
        let config = WorkerConfig {
            cache_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
