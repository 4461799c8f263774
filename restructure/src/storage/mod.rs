//! Storage drivers for the landing zone and the restructured output.
//!
//! Paths handed to a driver are `/`-separated and relative to the driver's
//! root; an empty string names the root itself.

mod local;
mod object;

pub use local::LocalStorage;
pub use object::ObjectStorage;

use std::future::Future;
use std::path::Path;

use chrono::{DateTime, Utc};
use restructure_config::shared::StorageConfig;

use crate::error::RestructureResult;

/// Metadata of one stored file.
#[derive(Debug, Clone)]
pub struct FileMeta {
    /// Path relative to the driver root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
}

/// Capabilities every storage backend offers to the pipeline.
///
/// Implementations must make [`StorageDriver::store`] atomic: readers of the
/// target path observe either the previous content or the new content, never
/// a partial write.
pub trait StorageDriver: Send + Sync + 'static {
    /// Whether a file exists at `path`.
    fn exists(&self, path: &str) -> impl Future<Output = RestructureResult<bool>> + Send;

    /// Reads the full content of the file at `path`.
    fn read(&self, path: &str) -> impl Future<Output = RestructureResult<Vec<u8>>> + Send;

    /// Atomically publishes a local staging file at `target`, replacing any
    /// previous content.
    fn store(
        &self,
        staging: &Path,
        target: &str,
    ) -> impl Future<Output = RestructureResult<()>> + Send;

    /// Moves a file within this storage.
    fn rename(&self, src: &str, dst: &str)
    -> impl Future<Output = RestructureResult<()>> + Send;

    /// Deletes the file at `path`.
    fn delete(&self, path: &str) -> impl Future<Output = RestructureResult<()>> + Send;

    /// Lists the immediate child directories of `path`.
    fn list_dirs(&self, path: &str) -> impl Future<Output = RestructureResult<Vec<String>>> + Send;

    /// Lists all files under `path`, recursively.
    fn walk(&self, path: &str) -> impl Future<Output = RestructureResult<Vec<FileMeta>>> + Send;
}

/// Runtime-selected storage backend.
#[derive(Debug, Clone)]
pub enum Storage {
    Local(LocalStorage),
    Object(ObjectStorage),
}

impl Storage {
    /// Builds a storage driver from its configuration.
    pub fn from_config(config: &StorageConfig) -> RestructureResult<Self> {
        match config {
            StorageConfig::Local { root } => Ok(Storage::Local(LocalStorage::new(root))),
            StorageConfig::S3 {
                bucket,
                region,
                endpoint,
                prefix,
            } => Ok(Storage::Object(ObjectStorage::s3(
                bucket,
                region.as_deref(),
                endpoint.as_deref(),
                prefix.as_deref(),
            )?)),
            StorageConfig::Azure {
                account,
                container,
                prefix,
            } => Ok(Storage::Object(ObjectStorage::azure(
                account,
                container,
                prefix.as_deref(),
            )?)),
        }
    }
}

impl StorageDriver for Storage {
    async fn exists(&self, path: &str) -> RestructureResult<bool> {
        match self {
            Storage::Local(s) => s.exists(path).await,
            Storage::Object(s) => s.exists(path).await,
        }
    }

    async fn read(&self, path: &str) -> RestructureResult<Vec<u8>> {
        match self {
            Storage::Local(s) => s.read(path).await,
            Storage::Object(s) => s.read(path).await,
        }
    }

    async fn store(&self, staging: &Path, target: &str) -> RestructureResult<()> {
        match self {
            Storage::Local(s) => s.store(staging, target).await,
            Storage::Object(s) => s.store(staging, target).await,
        }
    }

    async fn rename(&self, src: &str, dst: &str) -> RestructureResult<()> {
        match self {
            Storage::Local(s) => s.rename(src, dst).await,
            Storage::Object(s) => s.rename(src, dst).await,
        }
    }

    async fn delete(&self, path: &str) -> RestructureResult<()> {
        match self {
            Storage::Local(s) => s.delete(path).await,
            Storage::Object(s) => s.delete(path).await,
        }
    }

    async fn list_dirs(&self, path: &str) -> RestructureResult<Vec<String>> {
        match self {
            Storage::Local(s) => s.list_dirs(path).await,
            Storage::Object(s) => s.list_dirs(path).await,
        }
    }

    async fn walk(&self, path: &str) -> RestructureResult<Vec<FileMeta>> {
        match self {
            Storage::Local(s) => s.walk(path).await,
            Storage::Object(s) => s.walk(path).await,
        }
    }
}

/// Joins two relative storage paths, tolerating empty segments.
pub(crate) fn join_paths(base: &str, child: &str) -> String {
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base.trim_end_matches('/'), child),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_paths_handles_empty_segments() {
        assert_eq!(join_paths("", "topic"), "topic");
        assert_eq!(join_paths("landing", ""), "landing");
        assert_eq!(join_paths("landing/", "topic"), "landing/topic");
    }
}
