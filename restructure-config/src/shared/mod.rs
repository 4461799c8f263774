//! Shared configuration types for the restructure pipeline.

mod cleaner;
mod coordination;
mod format;
mod restructure;
mod service;
mod storage;
mod topics;
mod workers;

pub use cleaner::CleanerConfig;
pub use coordination::CoordinationConfig;
pub use format::{CompressionKind, DeduplicationConfig, FormatConfig, FormatKind};
pub use restructure::RestructureConfig;
pub use service::ServiceConfig;
pub use storage::{SourceConfig, StorageConfig, TargetConfig};
pub use topics::{TopicOverride, TopicsConfig};
pub use workers::WorkerConfig;

use thiserror::Error;

/// Validation failure for a configuration field.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A field value violates a constraint.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
