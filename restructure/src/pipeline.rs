//! Topic discovery and the lock-guarded scheduling of worker batches.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use restructure_config::shared::RestructureConfig;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::accounting::Accountant;
use crate::cleaner::{CleanSummary, Cleaner, TimestampCache};
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown};
use crate::error::{ErrorKind, RestructureResult};
use crate::lock::LockManager;
use crate::output::WriterCache;
use crate::paths::PathFactory;
use crate::restructure_error;
use crate::storage::{StorageDriver, join_paths};
use crate::types::{OffsetRange, TopicFile};
use crate::workers::{RestructureWorker, TopicSummary};

/// Aggregate outcome of one restructure pass.
#[derive(Debug, Default, Clone)]
pub struct PassSummary {
    pub topics_processed: u64,
    pub topics_skipped: u64,
    pub topics_failed: u64,
    pub files_processed: u64,
    pub files_failed: u64,
    pub records_written: u64,
}

/// Aggregate outcome of one cleaner pass.
#[derive(Debug, Default, Clone)]
pub struct CleanPassSummary {
    pub topics_processed: u64,
    pub topics_skipped: u64,
    pub files_checked: u64,
    pub files_deleted: u64,
}

/// Everything one topic task needs, cloned into its spawned future.
struct TopicContext<S: StorageDriver, T: StorageDriver> {
    config: Arc<RestructureConfig>,
    source: Arc<S>,
    target: Arc<T>,
    accountant: Arc<Accountant<T>>,
    locks: Arc<LockManager>,
    path_factory: PathFactory,
    staging_dir: PathBuf,
    shutdown: ShutdownRx,
}

impl<S: StorageDriver, T: StorageDriver> Clone for TopicContext<S, T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            source: self.source.clone(),
            target: self.target.clone(),
            accountant: self.accountant.clone(),
            locks: self.locks.clone(),
            path_factory: self.path_factory.clone(),
            staging_dir: self.staging_dir.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Orchestrates restructure and cleaner passes over the landing zone.
///
/// Holds the shared accountant, the per-run scratch directory and the lock
/// manager; individual topics run on a semaphore-bounded task set, each with
/// its own writer cache.
pub struct RestructurePipeline<S: StorageDriver, T: StorageDriver> {
    config: Arc<RestructureConfig>,
    source: Arc<S>,
    target: Arc<T>,
    accountant: Arc<Accountant<T>>,
    locks: Arc<LockManager>,
    path_factory: PathFactory,
    staging_dir: PathBuf,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
    // Scratch space for the whole run; removed on drop.
    _scratch: TempDir,
}

impl<S: StorageDriver, T: StorageDriver> RestructurePipeline<S, T> {
    /// Validates the configuration, recovers accounting state from the target
    /// and prepares this run's scratch space.
    pub async fn new(config: RestructureConfig, source: S, target: T) -> RestructureResult<Self> {
        config.validate().map_err(|err| {
            restructure_error!(ErrorKind::InvalidConfiguration, "configuration rejected")
                .with_source(err)
        })?;

        tokio::fs::create_dir_all(&config.workers.tmp_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("restructure-")
            .tempdir_in(&config.workers.tmp_dir)
            .map_err(|err| {
                restructure_error!(
                    ErrorKind::InvalidConfiguration,
                    "failed to create scratch directory"
                )
                .with_source(err)
            })?;
        let staging_dir = scratch.path().join("staging");
        tokio::fs::create_dir_all(&staging_dir).await?;

        let source = Arc::new(source);
        let target = Arc::new(target);
        let accountant = Arc::new(Accountant::new(target.clone(), scratch.path()).await?);
        let locks = Arc::new(LockManager::from_config(config.coordination.as_ref()).await?);
        let path_factory = PathFactory::from_name(
            &config.path_factory,
            config.format.kind,
            config.format.compression,
        )?;
        let (shutdown_tx, shutdown_rx) = create_shutdown();

        Ok(Self {
            config: Arc::new(config),
            source,
            target,
            accountant,
            locks,
            path_factory,
            staging_dir,
            shutdown_tx,
            shutdown_rx,
            _scratch: scratch,
        })
    }

    /// Requests a graceful stop; workers finish their current file first.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Snapshot of the accounted offsets, for reporting and tests.
    pub async fn accounted_offsets(&self) -> crate::accounting::OffsetRangeSet {
        self.accountant.offsets().await
    }

    /// Runs one restructure pass over every selected topic.
    pub async fn run_restructure_pass(&self) -> RestructureResult<PassSummary> {
        let topics = self.discover_topics().await?;
        info!(topics = topics.len(), "starting restructure pass");

        let semaphore = Arc::new(Semaphore::new(self.config.workers.num_workers));
        let mut tasks: JoinSet<RestructureResult<Option<TopicSummary>>> = JoinSet::new();

        for (topic, topic_path) in topics {
            if self.shutdown_rx.is_shutdown() {
                break;
            }
            let context = self.topic_context();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Ok(None);
                };
                process_topic(context, topic, topic_path).await
            });
        }

        let mut summary = PassSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Some(topic_summary))) => {
                    summary.topics_processed += 1;
                    summary.files_processed += topic_summary.files_processed;
                    summary.files_failed += topic_summary.files_failed;
                    summary.records_written += topic_summary.records_written;
                }
                Ok(Ok(None)) => summary.topics_skipped += 1,
                Ok(Err(err)) => {
                    summary.topics_failed += 1;
                    error!(error = %err, "topic batch failed");
                }
                Err(join_err) => {
                    summary.topics_failed += 1;
                    error!(error = %join_err, "topic task panicked");
                }
            }
        }

        // Without durable offsets the next pass would repeat work unsafely.
        self.accountant.flush().await?;

        info!(
            topics = summary.topics_processed,
            skipped = summary.topics_skipped,
            failed = summary.topics_failed,
            files = summary.files_processed,
            records = summary.records_written,
            "restructure pass finished"
        );

        Ok(summary)
    }

    /// Runs one cleaner pass, deleting fully extracted source files older
    /// than the configured age.
    pub async fn run_cleaner_pass(&self) -> RestructureResult<CleanPassSummary> {
        let topics = self.discover_topics().await?;
        info!(topics = topics.len(), "starting cleaner pass");

        let mut summary = CleanPassSummary::default();
        for (topic, topic_path) in topics {
            if self.shutdown_rx.is_shutdown() {
                break;
            }

            let Some(lock) = self.locks.try_acquire(&topic).await? else {
                debug!(topic = %topic, "topic locked by another process, skipped");
                summary.topics_skipped += 1;
                continue;
            };

            let result = self.clean_topic(&topic, &topic_path).await;
            if let Err(err) = self.locks.release(lock).await {
                warn!(topic = %topic, error = %err, "failed to release topic lock, ttl will reclaim it");
            }

            match result {
                Ok(clean_summary) => {
                    summary.topics_processed += 1;
                    summary.files_checked += clean_summary.files_checked;
                    summary.files_deleted += clean_summary.files_deleted;
                }
                Err(err) => {
                    error!(topic = %topic, error = %err, "cleaner batch failed");
                }
            }
        }

        self.accountant.flush().await?;

        info!(
            topics = summary.topics_processed,
            checked = summary.files_checked,
            deleted = summary.files_deleted,
            "cleaner pass finished"
        );

        Ok(summary)
    }

    /// Flushes and closes the accountant, then releases the scratch space.
    pub async fn close(self) -> RestructureResult<()> {
        self.accountant.flush().await?;
        if let Some(accountant) = Arc::into_inner(self.accountant) {
            accountant.close().await?;
        } else {
            warn!("accountant still shared at close, skipping writer shutdown");
        }
        Ok(())
    }

    async fn discover_topics(&self) -> RestructureResult<Vec<(String, String)>> {
        let mut topics = Vec::new();
        for base in &self.config.source.paths {
            let base = base.trim_matches('/');
            for topic in self.source.list_dirs(base).await? {
                if !self.config.topics.is_selected(&topic) {
                    debug!(topic = %topic, "topic excluded by configuration");
                    continue;
                }
                topics.push((topic.clone(), join_paths(base, &topic)));
            }
        }
        Ok(topics)
    }

    async fn clean_topic(&self, topic: &str, topic_path: &str) -> RestructureResult<CleanSummary> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(self.config.cleaner.age_days));

        let mut candidates = Vec::new();
        for meta in self.source.walk(topic_path).await? {
            let file_name = meta.path.rsplit('/').next().unwrap_or(&meta.path);
            let Ok(range) = OffsetRange::parse_file_name(file_name) else {
                continue;
            };
            if meta.last_modified > cutoff {
                continue;
            }
            if !self.accountant.contains(&range).await {
                continue;
            }
            candidates.push(TopicFile {
                topic: topic.to_string(),
                path: meta.path,
                range,
                last_modified: meta.last_modified,
                size: meta.size,
            });
        }

        if candidates.is_empty() {
            return Ok(CleanSummary {
                topic: topic.to_string(),
                ..Default::default()
            });
        }

        let cache = TimestampCache::new(
            self.target.clone(),
            self.config.format.kind,
            self.config.format.compression,
            self.config.cleaner.cache_offsets_size,
        );
        let cleaner = Cleaner::new(
            topic.to_string(),
            self.source.clone(),
            self.accountant.clone(),
            self.path_factory.clone(),
            cache,
            self.shutdown_rx.clone(),
        );
        cleaner.run(candidates).await
    }

    fn topic_context(&self) -> TopicContext<S, T> {
        TopicContext {
            config: self.config.clone(),
            source: self.source.clone(),
            target: self.target.clone(),
            accountant: self.accountant.clone(),
            locks: self.locks.clone(),
            path_factory: self.path_factory.clone(),
            staging_dir: self.staging_dir.clone(),
            shutdown: self.shutdown_rx.clone(),
        }
    }
}

async fn process_topic<S: StorageDriver, T: StorageDriver>(
    context: TopicContext<S, T>,
    topic: String,
    topic_path: String,
) -> RestructureResult<Option<TopicSummary>> {
    let Some(lock) = context.locks.try_acquire(&topic).await? else {
        debug!(topic = %topic, "topic locked by another process, skipped");
        return Ok(None);
    };

    let result = restructure_topic(&context, &topic, &topic_path).await;

    if let Err(err) = context.locks.release(lock).await {
        warn!(topic = %topic, error = %err, "failed to release topic lock, ttl will reclaim it");
    }

    result.map(Some)
}

async fn restructure_topic<S: StorageDriver, T: StorageDriver>(
    context: &TopicContext<S, T>,
    topic: &str,
    topic_path: &str,
) -> RestructureResult<TopicSummary> {
    let files = eligible_files(context, topic, topic_path).await?;
    if files.is_empty() {
        debug!(topic = %topic, "no eligible files this pass");
        return Ok(TopicSummary {
            topic: topic.to_string(),
            ..Default::default()
        });
    }

    let dedup = context
        .config
        .topics
        .deduplication_for(topic, &context.config.format.deduplicate);
    let cache = WriterCache::new(
        context.config.workers.cache_size,
        context.target.clone(),
        context.accountant.clone(),
        context.path_factory.clone(),
        context.staging_dir.clone(),
        context.config.format.kind,
        context.config.format.compression,
        dedup,
    );
    let worker = RestructureWorker::new(
        topic.to_string(),
        context.source.clone(),
        cache,
        context.shutdown.clone(),
    );

    worker.run(files).await
}

/// Lists the topic's files that are parseable, old enough and not yet
/// accounted, in offset order, truncated to the per-pass bound.
async fn eligible_files<S: StorageDriver, T: StorageDriver>(
    context: &TopicContext<S, T>,
    topic: &str,
    topic_path: &str,
) -> RestructureResult<Vec<TopicFile>> {
    let cutoff =
        Utc::now() - ChronoDuration::seconds(context.config.workers.min_file_age_secs as i64);

    let mut files = Vec::new();
    for meta in context.source.walk(topic_path).await? {
        let file_name = meta.path.rsplit('/').next().unwrap_or(&meta.path);
        let Ok(range) = OffsetRange::parse_file_name(file_name) else {
            debug!(path = %meta.path, "file name carries no offset range, skipping");
            continue;
        };
        if meta.last_modified > cutoff {
            debug!(path = %meta.path, "file may still be written by the sink, skipping");
            continue;
        }
        if context.accountant.contains(&range).await {
            continue;
        }

        files.push(TopicFile {
            topic: topic.to_string(),
            path: meta.path,
            range,
            last_modified: meta.last_modified,
            size: meta.size,
        });
    }

    files.sort_by(|a, b| {
        (a.range.topic_partition().partition(), a.range.from_offset())
            .cmp(&(b.range.topic_partition().partition(), b.range.from_offset()))
    });
    files.truncate(context.config.workers.max_files_per_topic);

    Ok(files)
}
