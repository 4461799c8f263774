use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::shared::format::DeduplicationConfig;

/// Per-topic configuration override.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TopicOverride {
    /// Deduplication settings for this topic, merged over the defaults.
    #[serde(default)]
    pub deduplicate: Option<DeduplicationConfig>,
}

/// Topic selection and per-topic overrides.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TopicsConfig {
    /// Topics to process. Empty means all discovered topics.
    #[serde(default)]
    pub include: Vec<String>,
    /// Topics to skip even when discovered.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Per-topic overrides keyed by topic name.
    #[serde(default)]
    pub overrides: HashMap<String, TopicOverride>,
}

impl TopicsConfig {
    /// Whether a discovered topic should be processed.
    pub fn is_selected(&self, topic: &str) -> bool {
        if self.exclude.iter().any(|t| t == topic) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|t| t == topic)
    }

    /// Resolves the deduplication settings for a topic.
    pub fn deduplication_for(
        &self,
        topic: &str,
        defaults: &DeduplicationConfig,
    ) -> DeduplicationConfig {
        match self
            .overrides
            .get(topic)
            .and_then(|o| o.deduplicate.as_ref())
        {
            Some(override_config) => defaults.merged_with(override_config),
            None => defaults.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_wins_over_inclusion() {
        let config = TopicsConfig {
            include: vec!["a".to_string()],
            exclude: vec!["a".to_string()],
            overrides: HashMap::new(),
        };
        assert!(!config.is_selected("a"));
    }

    #[test]
    fn empty_include_selects_everything() {
        let config = TopicsConfig::default();
        assert!(config.is_selected("anything"));
    }
}
