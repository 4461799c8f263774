use std::path::Path;
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};

use crate::error::{ErrorKind, RestructureResult};
use crate::restructure_error;
use crate::storage::{FileMeta, StorageDriver, join_paths};

/// Storage driver over an object store (S3-compatible or Azure Blob).
///
/// Object stores publish whole objects atomically, so [`ObjectStorage::store`]
/// is a single put of the staging file's bytes.
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectStorage {
    /// Builds an S3-backed driver. Credentials come from the environment.
    pub fn s3(
        bucket: &str,
        region: Option<&str>,
        endpoint: Option<&str>,
        prefix: Option<&str>,
    ) -> RestructureResult<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        let store = builder.build().map_err(|err| {
            restructure_error!(
                ErrorKind::InvalidConfiguration,
                "failed to configure s3 storage",
                bucket
            )
            .with_source(err)
        })?;

        Ok(Self {
            store: Arc::new(store),
            prefix: prefix.unwrap_or_default().to_string(),
        })
    }

    /// Builds an Azure Blob-backed driver. Credentials come from the environment.
    pub fn azure(account: &str, container: &str, prefix: Option<&str>) -> RestructureResult<Self> {
        let store = MicrosoftAzureBuilder::from_env()
            .with_account(account)
            .with_container_name(container)
            .build()
            .map_err(|err| {
                restructure_error!(
                    ErrorKind::InvalidConfiguration,
                    "failed to configure azure storage",
                    container
                )
                .with_source(err)
            })?;

        Ok(Self {
            store: Arc::new(store),
            prefix: prefix.unwrap_or_default().to_string(),
        })
    }

    fn resolve(&self, path: &str) -> ObjectPath {
        ObjectPath::from(join_paths(&self.prefix, path))
    }

    fn relative(&self, location: &ObjectPath) -> String {
        let location = location.to_string();
        match location.strip_prefix(&self.prefix) {
            Some(stripped) => stripped.trim_start_matches('/').to_string(),
            None => location,
        }
    }

    pub async fn exists(&self, path: &str) -> RestructureResult<bool> {
        match self.store.head(&self.resolve(path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(restructure_error!(
                ErrorKind::TargetIo,
                "failed to check object existence",
                path
            )
            .with_source(err)),
        }
    }

    pub async fn read(&self, path: &str) -> RestructureResult<Vec<u8>> {
        let result = self
            .store
            .get(&self.resolve(path))
            .await
            .map_err(|err| {
                restructure_error!(ErrorKind::SourceIo, "failed to read object", path)
                    .with_source(err)
            })?;
        let bytes = result.bytes().await.map_err(|err| {
            restructure_error!(ErrorKind::SourceIo, "failed to read object body", path)
                .with_source(err)
        })?;

        Ok(bytes.to_vec())
    }

    pub async fn store(&self, staging: &Path, target: &str) -> RestructureResult<()> {
        let bytes = tokio::fs::read(staging).await?;
        self.store
            .put(&self.resolve(target), PutPayload::from(bytes))
            .await
            .map_err(|err| {
                restructure_error!(ErrorKind::TargetIo, "failed to publish object", target)
                    .with_source(err)
            })?;

        Ok(())
    }

    pub async fn rename(&self, src: &str, dst: &str) -> RestructureResult<()> {
        self.store
            .rename(&self.resolve(src), &self.resolve(dst))
            .await
            .map_err(|err| {
                restructure_error!(ErrorKind::TargetIo, "failed to rename object", src)
                    .with_source(err)
            })
    }

    pub async fn delete(&self, path: &str) -> RestructureResult<()> {
        self.store
            .delete(&self.resolve(path))
            .await
            .map_err(|err| {
                restructure_error!(ErrorKind::TargetIo, "failed to delete object", path)
                    .with_source(err)
            })
    }

    pub async fn list_dirs(&self, path: &str) -> RestructureResult<Vec<String>> {
        let prefix = self.resolve(path);
        let listing = self
            .store
            .list_with_delimiter(Some(&prefix))
            .await
            .map_err(|err| {
                restructure_error!(ErrorKind::SourceIo, "failed to list storage", path)
                    .with_source(err)
            })?;

        let mut dirs: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().map(|name| name.to_string()))
            .collect();
        dirs.sort();

        Ok(dirs)
    }

    pub async fn walk(&self, path: &str) -> RestructureResult<Vec<FileMeta>> {
        let prefix = self.resolve(path);
        let objects: Vec<_> = self
            .store
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(|err| {
                restructure_error!(ErrorKind::SourceIo, "failed to walk storage", path)
                    .with_source(err)
            })?;

        let mut files: Vec<FileMeta> = objects
            .into_iter()
            .map(|meta| FileMeta {
                path: self.relative(&meta.location),
                size: meta.size as u64,
                last_modified: meta.last_modified,
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(files)
    }
}

impl StorageDriver for ObjectStorage {
    async fn exists(&self, path: &str) -> RestructureResult<bool> {
        ObjectStorage::exists(self, path).await
    }

    async fn read(&self, path: &str) -> RestructureResult<Vec<u8>> {
        ObjectStorage::read(self, path).await
    }

    async fn store(&self, staging: &Path, target: &str) -> RestructureResult<()> {
        ObjectStorage::store(self, staging, target).await
    }

    async fn rename(&self, src: &str, dst: &str) -> RestructureResult<()> {
        ObjectStorage::rename(self, src, dst).await
    }

    async fn delete(&self, path: &str) -> RestructureResult<()> {
        ObjectStorage::delete(self, path).await
    }

    async fn list_dirs(&self, path: &str) -> RestructureResult<Vec<String>> {
        ObjectStorage::list_dirs(self, path).await
    }

    async fn walk(&self, path: &str) -> RestructureResult<Vec<FileMeta>> {
        ObjectStorage::walk(self, path).await
    }
}
