use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::RestructureResult;
use crate::output::WriterCache;
use crate::source::decode_records;
use crate::storage::StorageDriver;
use crate::types::TopicFile;

/// Outcome of one topic batch.
#[derive(Debug, Default, Clone)]
pub struct TopicSummary {
    pub topic: String,
    pub files_processed: u64,
    pub files_failed: u64,
    pub files_empty: u64,
    pub records_written: u64,
}

/// Processes the files of one topic through a dedicated writer cache.
///
/// The worker owns its cache exclusively; the cache is flushed after every
/// file and closed (publishing all staged output) when the batch ends. A
/// failing file aborts only that file; later files of the batch still run.
pub struct RestructureWorker<S: StorageDriver, T: StorageDriver> {
    topic: String,
    source: Arc<S>,
    cache: WriterCache<T>,
    shutdown: ShutdownRx,
}

impl<S: StorageDriver, T: StorageDriver> RestructureWorker<S, T> {
    pub fn new(
        topic: String,
        source: Arc<S>,
        cache: WriterCache<T>,
        shutdown: ShutdownRx,
    ) -> Self {
        Self {
            topic,
            source,
            cache,
            shutdown,
        }
    }

    /// Runs the batch to completion and publishes all staged output.
    pub async fn run(mut self, files: Vec<TopicFile>) -> RestructureResult<TopicSummary> {
        let mut summary = TopicSummary {
            topic: self.topic.clone(),
            ..Default::default()
        };

        for file in &files {
            if self.shutdown.is_shutdown() {
                info!(topic = %self.topic, "shutdown requested, stopping batch early");
                break;
            }

            match self.process_file(file).await {
                Ok(0) => summary.files_empty += 1,
                Ok(records) => {
                    summary.files_processed += 1;
                    summary.records_written += records;
                }
                Err(err) => {
                    summary.files_failed += 1;
                    error!(
                        topic = %self.topic,
                        path = %file.path,
                        error = %err,
                        "failed to process source file, its offsets stay uncommitted"
                    );
                }
            }
        }

        self.cache.close().await?;

        info!(
            topic = %summary.topic,
            files = summary.files_processed,
            failed = summary.files_failed,
            records = summary.records_written,
            "topic batch finished"
        );

        Ok(summary)
    }

    async fn process_file(&mut self, file: &TopicFile) -> RestructureResult<u64> {
        debug!(path = %file.path, range = %file.range, "processing source file");

        let bytes = self.source.read(&file.path).await?;
        let records = decode_records(&bytes, &file.range)?;
        if records.is_empty() {
            warn!(path = %file.path, "source file contains no records, skipping");
            return Ok(0);
        }

        let topic_partition = file.range.topic_partition().clone();
        for (offset, record) in &records {
            self.cache
                .write(
                    &self.topic,
                    &topic_partition,
                    *offset,
                    record,
                    Some(file.last_modified),
                )
                .await?;
        }

        // Keep staged bytes on disk between files; publication happens on
        // close or eviction.
        self.cache.flush()?;

        Ok(records.len() as u64)
    }
}
