use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;

use crate::error::{ErrorKind, RestructureResult};
use crate::restructure_error;
use crate::storage::{FileMeta, StorageDriver};

/// Storage driver over a plain local filesystem tree.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    pub async fn exists(&self, path: &str) -> RestructureResult<bool> {
        Ok(fs::try_exists(self.resolve(path)).await?)
    }

    pub async fn read(&self, path: &str) -> RestructureResult<Vec<u8>> {
        fs::read(self.resolve(path)).await.map_err(|err| {
            restructure_error!(ErrorKind::SourceIo, "failed to read file", path).with_source(err)
        })
    }

    pub async fn store(&self, staging: &Path, target: &str) -> RestructureResult<()> {
        let target_path = self.resolve(target);
        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // The staging file may live on another filesystem, so copy it next to
        // the target first and rename into place for atomic replacement.
        let scratch = PathBuf::from(format!("{}.inflight", target_path.display()));
        fs::copy(staging, &scratch).await.map_err(|err| {
            restructure_error!(ErrorKind::TargetIo, "failed to copy staging file", target)
                .with_source(err)
        })?;
        fs::rename(&scratch, &target_path).await.map_err(|err| {
            restructure_error!(ErrorKind::TargetIo, "failed to publish staging file", target)
                .with_source(err)
        })?;

        Ok(())
    }

    pub async fn rename(&self, src: &str, dst: &str) -> RestructureResult<()> {
        let dst_path = self.resolve(dst);
        if let Some(parent) = dst_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(self.resolve(src), dst_path).await.map_err(|err| {
            restructure_error!(ErrorKind::TargetIo, "failed to rename file", src).with_source(err)
        })
    }

    pub async fn delete(&self, path: &str) -> RestructureResult<()> {
        fs::remove_file(self.resolve(path)).await.map_err(|err| {
            restructure_error!(ErrorKind::TargetIo, "failed to delete file", path).with_source(err)
        })
    }

    pub async fn list_dirs(&self, path: &str) -> RestructureResult<Vec<String>> {
        let dir = self.resolve(path);
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut dirs = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                dirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        dirs.sort();

        Ok(dirs)
    }

    pub async fn walk(&self, path: &str) -> RestructureResult<Vec<FileMeta>> {
        let root = self.resolve(path);
        if !fs::try_exists(&root).await? {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(entry_path);
                    continue;
                }

                let metadata = entry.metadata().await?;
                let last_modified: DateTime<Utc> = metadata
                    .modified()
                    .map(DateTime::from)
                    .unwrap_or_else(|_| Utc::now());
                let relative = entry_path
                    .strip_prefix(&self.root)
                    .unwrap_or(&entry_path)
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");

                files.push(FileMeta {
                    path: relative,
                    size: metadata.len(),
                    last_modified,
                });
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(files)
    }
}

impl StorageDriver for LocalStorage {
    async fn exists(&self, path: &str) -> RestructureResult<bool> {
        LocalStorage::exists(self, path).await
    }

    async fn read(&self, path: &str) -> RestructureResult<Vec<u8>> {
        LocalStorage::read(self, path).await
    }

    async fn store(&self, staging: &Path, target: &str) -> RestructureResult<()> {
        LocalStorage::store(self, staging, target).await
    }

    async fn rename(&self, src: &str, dst: &str) -> RestructureResult<()> {
        LocalStorage::rename(self, src, dst).await
    }

    async fn delete(&self, path: &str) -> RestructureResult<()> {
        LocalStorage::delete(self, path).await
    }

    async fn list_dirs(&self, path: &str) -> RestructureResult<Vec<String>> {
        LocalStorage::list_dirs(self, path).await
    }

    async fn walk(&self, path: &str) -> RestructureResult<Vec<FileMeta>> {
        LocalStorage::walk(self, path).await
    }
}
