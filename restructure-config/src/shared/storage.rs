use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Storage backend selection for a source or target tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Plain local filesystem rooted at `root`.
    Local { root: String },
    /// S3-compatible object store.
    S3 {
        bucket: String,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        prefix: Option<String>,
    },
    /// Azure Blob storage container.
    Azure {
        account: String,
        container: String,
        #[serde(default)]
        prefix: Option<String>,
    },
}

impl StorageConfig {
    /// Validates storage configuration settings.
    pub fn validate(&self, field: &str) -> Result<(), ValidationError> {
        let empty = |name: &str| ValidationError::InvalidFieldValue {
            field: format!("{field}.{name}"),
            constraint: "must not be empty".to_string(),
        };

        match self {
            StorageConfig::Local { root } => {
                if root.is_empty() {
                    return Err(empty("root"));
                }
            }
            StorageConfig::S3 { bucket, .. } => {
                if bucket.is_empty() {
                    return Err(empty("bucket"));
                }
            }
            StorageConfig::Azure {
                account, container, ..
            } => {
                if account.is_empty() {
                    return Err(empty("account"));
                }
                if container.is_empty() {
                    return Err(empty("container"));
                }
            }
        }

        Ok(())
    }
}

/// Source landing-zone configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    /// Storage backend holding the landing zone.
    pub storage: StorageConfig,
    /// Paths under the storage root whose child directories are topics.
    #[serde(default = "default_source_paths")]
    pub paths: Vec<String>,
}

impl SourceConfig {
    /// Validates source configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.storage.validate("source.storage")?;

        if self.paths.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "source.paths".to_string(),
                constraint: "must contain at least one path".to_string(),
            });
        }

        Ok(())
    }
}

/// Restructured output configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TargetConfig {
    /// Storage backend receiving the restructured output.
    pub storage: StorageConfig,
}

impl TargetConfig {
    /// Validates target configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.storage.validate("target.storage")
    }
}

fn default_source_paths() -> Vec<String> {
    vec![String::new()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_local_root_is_rejected() {
        let config = StorageConfig::Local {
            root: String::new(),
        };
        assert!(config.validate("source.storage").is_err());
    }

    #[test]
    fn s3_requires_bucket() {
        let config = StorageConfig::S3 {
            bucket: String::new(),
            region: None,
            endpoint: None,
            prefix: None,
        };
        assert!(config.validate("target.storage").is_err());
    }
}
