use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{
    CleanerConfig, CoordinationConfig, FormatConfig, ServiceConfig, SourceConfig, TargetConfig,
    TopicsConfig, ValidationError, WorkerConfig,
};

/// Complete configuration for one restructurer instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RestructureConfig {
    /// Landing-zone source tree.
    pub source: SourceConfig,
    /// Restructured output tree.
    pub target: TargetConfig,
    /// Output format and deduplication defaults.
    #[serde(default)]
    pub format: FormatConfig,
    /// Topic selection and overrides.
    #[serde(default)]
    pub topics: TopicsConfig,
    /// Worker pool sizing and staging directory.
    #[serde(default)]
    pub workers: WorkerConfig,
    /// Service-mode behavior.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Cleaner behavior.
    #[serde(default)]
    pub cleaner: CleanerConfig,
    /// Optional Redis-backed topic locking.
    #[serde(default)]
    pub coordination: Option<CoordinationConfig>,
    /// Registry name of the record path strategy.
    #[serde(default = "default_path_factory")]
    pub path_factory: String,
}

fn default_path_factory() -> String {
    "observationKey".to_string()
}

impl RestructureConfig {
    /// Validates the full configuration, failing on the first invalid section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.target.validate()?;
        self.workers.validate()?;
        self.service.validate()?;
        self.cleaner.validate()?;
        if let Some(coordination) = &self.coordination {
            coordination.validate()?;
        }

        Ok(())
    }
}

impl Config for RestructureConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[
        "source.paths",
        "topics.include",
        "topics.exclude",
        "format.deduplicate.distinct_fields",
        "format.deduplicate.ignore_fields",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::StorageConfig;

    fn base_config() -> RestructureConfig {
        RestructureConfig {
            source: SourceConfig {
                storage: StorageConfig::Local {
                    root: "/data/landing".to_string(),
                },
                paths: vec![String::new()],
            },
            target: TargetConfig {
                storage: StorageConfig::Local {
                    root: "/data/output".to_string(),
                },
            },
            format: FormatConfig::default(),
            topics: TopicsConfig::default(),
            workers: WorkerConfig::default(),
            service: ServiceConfig::default(),
            cleaner: CleanerConfig::default(),
            coordination: None,
            path_factory: "observationKey".to_string(),
        }
    }

    #[test]
    fn base_config_is_valid() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn invalid_section_fails_validation() {
        let mut config = base_config();
        config.workers.num_workers = 0;
        assert!(config.validate().is_err());
    }
}
