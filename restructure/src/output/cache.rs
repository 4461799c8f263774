use std::path::PathBuf;
use std::sync::Arc;

use apache_avro::types::Value;
use chrono::{DateTime, Utc};
use lru::LruCache;
use restructure_config::shared::{CompressionKind, DeduplicationConfig, FormatKind};
use tracing::{debug, error};

use crate::accounting::{Accountant, Bin, Transaction};
use crate::error::{ErrorKind, RestructureResult};
use crate::output::OutputWriter;
use crate::paths::PathFactory;
use crate::restructure_error;
use crate::storage::StorageDriver;
use crate::types::TopicPartition;

/// Cap on suffix rotation for one record; reaching it means no compatible
/// output file could be found or created.
const MAX_SUFFIX: u32 = 100;

/// Bin category for records written by the restructurer.
const WRITTEN_CATEGORY: &str = "written";

/// Bounded set of open output writers with least-recently-used eviction.
///
/// One cache exists per topic worker; it is not shared across tasks. Eviction
/// closes the evicted writer, which publishes its staged file and commits its
/// ledger. Recency is tracked by the underlying hash-map-plus-list, not by
/// wall-clock timestamps.
pub struct WriterCache<S: StorageDriver> {
    writers: LruCache<String, OutputWriter>,
    capacity: usize,
    storage: Arc<S>,
    accountant: Arc<Accountant<S>>,
    path_factory: PathFactory,
    scratch_dir: PathBuf,
    format: FormatKind,
    compression: CompressionKind,
    dedup: DeduplicationConfig,
}

impl<S: StorageDriver> WriterCache<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capacity: usize,
        storage: Arc<S>,
        accountant: Arc<Accountant<S>>,
        path_factory: PathFactory,
        scratch_dir: PathBuf,
        format: FormatKind,
        compression: CompressionKind,
        dedup: DeduplicationConfig,
    ) -> Self {
        Self {
            writers: LruCache::unbounded(),
            capacity: capacity.max(1),
            storage,
            accountant,
            path_factory,
            scratch_dir,
            format,
            compression,
            dedup,
        }
    }

    /// Routes one record to its output file, opening or evicting writers as
    /// needed. Schema-incompatible destinations are retried under rotated
    /// suffixes.
    pub async fn write(
        &mut self,
        topic: &str,
        topic_partition: &TopicPartition,
        offset: i64,
        record: &Value,
        fallback_time: Option<DateTime<Utc>>,
    ) -> RestructureResult<()> {
        let mut suffix = 0;

        while suffix < MAX_SUFFIX {
            let organization = self
                .path_factory
                .organize(topic, record, suffix, fallback_time)?;
            let transaction = Transaction {
                topic_partition: topic_partition.clone(),
                offset,
                bin: Bin {
                    topic: topic.to_string(),
                    device: organization.device.clone(),
                    category: WRITTEN_CATEGORY.to_string(),
                    time: organization.bucket.clone(),
                },
            };

            if let Some(writer) = self.writers.get_mut(&organization.path) {
                if writer.write_record(record, transaction)? {
                    return Ok(());
                }
                suffix += 1;
                continue;
            }

            self.ensure_capacity().await?;

            let opened = OutputWriter::open(
                &*self.storage,
                &self.scratch_dir,
                &organization.path,
                record,
                self.format,
                self.compression,
                self.dedup.clone(),
            )
            .await?;

            match opened {
                Some(mut writer) => {
                    if writer.write_record(record, transaction)? {
                        self.writers.put(organization.path, writer);
                        return Ok(());
                    }
                    writer.discard();
                    suffix += 1;
                }
                None => {
                    debug!(
                        path = %organization.path,
                        "existing target has an incompatible schema, rotating suffix"
                    );
                    suffix += 1;
                }
            }
        }

        Err(restructure_error!(
            ErrorKind::MalformedRecord,
            "no schema-compatible output path found",
            topic
        ))
    }

    /// Flushes every open writer's buffered rows to its staged file.
    pub fn flush(&mut self) -> RestructureResult<()> {
        for (_, writer) in self.writers.iter_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Closes every writer, publishing error-free ones. Returns the first
    /// failure after attempting all writers.
    pub async fn close(mut self) -> RestructureResult<()> {
        let mut first_error = None;

        while let Some((path, writer)) = self.writers.pop_lru() {
            if let Err(err) = writer.close(&*self.storage, &self.accountant).await {
                error!(path = %path, error = %err, "failed to close output writer");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of currently open writers.
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    async fn ensure_capacity(&mut self) -> RestructureResult<()> {
        while self.writers.len() >= self.capacity {
            let Some((path, writer)) = self.writers.pop_lru() else {
                break;
            };
            debug!(path = %path, "evicting least recently used writer");
            writer.close(&*self.storage, &self.accountant).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use crate::test_utils::observation_record;
    use tempfile::TempDir;

    async fn cache_fixture(
        capacity: usize,
    ) -> (TempDir, TempDir, Arc<Accountant<LocalStorage>>, WriterCache<LocalStorage>) {
        let target = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(target.path()));
        let accountant = Arc::new(
            Accountant::new(storage.clone(), scratch.path())
                .await
                .unwrap(),
        );
        let factory =
            PathFactory::from_name("observationKey", FormatKind::Csv, CompressionKind::None)
                .unwrap();
        let cache = WriterCache::new(
            capacity,
            storage,
            accountant.clone(),
            factory,
            scratch.path().to_path_buf(),
            FormatKind::Csv,
            CompressionKind::None,
            DeduplicationConfig::default(),
        );
        (target, scratch, accountant, cache)
    }

    const HOUR_NANOS: i64 = 3_600_000_000_000;

    #[tokio::test]
    async fn records_in_one_bucket_share_a_writer() {
        let (_target, _scratch, _accountant, mut cache) = cache_fixture(4).await;
        let tp = TopicPartition::new("t", 0);

        for offset in 0..3 {
            let record = observation_record("p", "u", "s", offset * 1_000);
            cache.write("t", &tp, offset, &record, None).await.unwrap();
        }

        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn capacity_one_evicts_and_publishes() {
        let (target, _scratch, _accountant, mut cache) = cache_fixture(1).await;
        let tp = TopicPartition::new("t", 0);

        let first = observation_record("p", "u", "s", 0);
        let second = observation_record("p", "u", "s", HOUR_NANOS);
        cache.write("t", &tp, 0, &first, None).await.unwrap();
        cache.write("t", &tp, 1, &second, None).await.unwrap();

        // The first bucket's writer was evicted and published.
        assert_eq!(cache.len(), 1);
        assert!(target.path().join("t/p/u/s/19700101_00.csv").exists());
        assert!(!target.path().join("t/p/u/s/19700101_01.csv").exists());

        cache.close().await.unwrap();
        assert!(target.path().join("t/p/u/s/19700101_01.csv").exists());
    }

    #[tokio::test]
    async fn close_commits_all_ledgers() {
        let (_target, _scratch, accountant, mut cache) = cache_fixture(4).await;
        let tp = TopicPartition::new("t", 0);

        for offset in 0..4 {
            let record = observation_record("p", "u", "s", offset * HOUR_NANOS);
            cache.write("t", &tp, offset, &record, None).await.unwrap();
        }
        cache.close().await.unwrap();

        let offsets = accountant.offsets().await;
        assert!(offsets.contains(&crate::types::OffsetRange::new(tp, 0, 3)));
    }
}
