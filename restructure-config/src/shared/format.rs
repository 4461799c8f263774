use serde::{Deserialize, Serialize};

/// Output record format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Flat CSV with a header row.
    #[default]
    Csv,
    /// One JSON object per line.
    Json,
}

impl FormatKind {
    /// File extension for this format, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            FormatKind::Csv => "csv",
            FormatKind::Json => "json",
        }
    }
}

/// Output compression codec.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionKind {
    /// No compression.
    #[default]
    None,
    /// Gzip stream compression.
    Gzip,
    /// Single-entry zip archive.
    Zip,
}

impl CompressionKind {
    /// File extension suffix for this codec, including the leading dot,
    /// or an empty string for no compression.
    pub fn extension(&self) -> &'static str {
        match self {
            CompressionKind::None => "",
            CompressionKind::Gzip => ".gz",
            CompressionKind::Zip => ".zip",
        }
    }
}

/// Deduplication settings applied when an output file is published.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeduplicationConfig {
    /// Whether deduplication runs at all.
    #[serde(default)]
    pub enable: bool,
    /// Fields that define record identity. Empty means all fields except
    /// `ignore_fields`.
    #[serde(default)]
    pub distinct_fields: Vec<String>,
    /// Fields excluded from identity when `distinct_fields` is empty.
    #[serde(default)]
    pub ignore_fields: Vec<String>,
}

impl DeduplicationConfig {
    /// Merges a per-topic override over these defaults.
    ///
    /// The two field lists are merged independently: an override replaces a
    /// list only when it provides a non-empty one.
    pub fn merged_with(&self, other: &DeduplicationConfig) -> DeduplicationConfig {
        DeduplicationConfig {
            enable: other.enable || self.enable,
            distinct_fields: if other.distinct_fields.is_empty() {
                self.distinct_fields.clone()
            } else {
                other.distinct_fields.clone()
            },
            ignore_fields: if other.ignore_fields.is_empty() {
                self.ignore_fields.clone()
            } else {
                other.ignore_fields.clone()
            },
        }
    }
}

/// Output format configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FormatConfig {
    /// Record format for output files.
    #[serde(default)]
    pub kind: FormatKind,
    /// Compression applied to output files.
    #[serde(default)]
    pub compression: CompressionKind,
    /// Default deduplication behavior, overridable per topic.
    #[serde(default)]
    pub deduplicate: DeduplicationConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_and_ignore_fields_merge_independently() {
        let defaults = DeduplicationConfig {
            enable: true,
            distinct_fields: vec!["key.sourceId".to_string()],
            ignore_fields: vec!["value.timeReceived".to_string()],
        };
        let overrides = DeduplicationConfig {
            enable: false,
            distinct_fields: vec![],
            ignore_fields: vec!["value.offset".to_string()],
        };

        let merged = defaults.merged_with(&overrides);
        assert!(merged.enable);
        assert_eq!(merged.distinct_fields, vec!["key.sourceId".to_string()]);
        assert_eq!(merged.ignore_fields, vec!["value.offset".to_string()]);
    }

    #[test]
    fn extensions_compose() {
        assert_eq!(FormatKind::Csv.extension(), "csv");
        assert_eq!(CompressionKind::Gzip.extension(), ".gz");
        assert_eq!(CompressionKind::None.extension(), "");
    }
}
