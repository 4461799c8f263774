//! Landing-zone cleaner: deletes source files whose every record has been
//! verified present in its restructured target.

mod timestamp_cache;

pub use timestamp_cache::{TargetCheck, TimestampCache};

use std::sync::Arc;

use apache_avro::types::Value;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::accounting::{Accountant, Bin, Ledger};
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::RestructureResult;
use crate::paths::PathFactory;
use crate::source::decode_records;
use crate::storage::StorageDriver;
use crate::types::TopicFile;

/// Cap on suffix rotation while resolving a record's target file.
const MAX_SUFFIX: u32 = 100;

/// Bin category counted for deleted records.
const DELETED_CATEGORY: &str = "deleted";

/// Outcome of one cleaner batch over a topic.
#[derive(Debug, Default, Clone)]
pub struct CleanSummary {
    pub topic: String,
    pub files_checked: u64,
    pub files_deleted: u64,
    pub files_retained: u64,
}

/// Verifies and deletes fully extracted source files of one topic.
///
/// A file is deleted only when every one of its records resolves to
/// [`TargetCheck::Found`] in the expected output file. Any record that cannot
/// be verified, for whatever reason, retains the file for a later pass.
pub struct Cleaner<S: StorageDriver, T: StorageDriver> {
    topic: String,
    source: Arc<S>,
    accountant: Arc<Accountant<T>>,
    path_factory: PathFactory,
    cache: TimestampCache<T>,
    shutdown: ShutdownRx,
}

impl<S: StorageDriver, T: StorageDriver> Cleaner<S, T> {
    pub fn new(
        topic: String,
        source: Arc<S>,
        accountant: Arc<Accountant<T>>,
        path_factory: PathFactory,
        cache: TimestampCache<T>,
        shutdown: ShutdownRx,
    ) -> Self {
        Self {
            topic,
            source,
            accountant,
            path_factory,
            cache,
            shutdown,
        }
    }

    /// Checks each candidate file and deletes the fully extracted ones.
    pub async fn run(mut self, files: Vec<TopicFile>) -> RestructureResult<CleanSummary> {
        let mut summary = CleanSummary {
            topic: self.topic.clone(),
            ..Default::default()
        };

        for file in &files {
            if self.shutdown.is_shutdown() {
                info!(topic = %self.topic, "shutdown requested, stopping cleaner early");
                break;
            }

            summary.files_checked += 1;
            match self.check_file(file).await {
                Ok(Some(ledger)) => {
                    self.source.delete(&file.path).await?;
                    self.accountant.process(ledger).await?;
                    summary.files_deleted += 1;
                    info!(path = %file.path, "deleted fully extracted source file");
                }
                Ok(None) => {
                    summary.files_retained += 1;
                    debug!(path = %file.path, "source file not fully extracted yet, keeping it");
                }
                Err(err) => {
                    summary.files_retained += 1;
                    warn!(path = %file.path, error = %err, "failed to verify source file, keeping it");
                }
            }
        }

        info!(
            topic = %summary.topic,
            checked = summary.files_checked,
            deleted = summary.files_deleted,
            "cleaner batch finished"
        );

        Ok(summary)
    }

    /// Returns the deletion ledger when every record of the file is present in
    /// its target, `None` otherwise.
    async fn check_file(&mut self, file: &TopicFile) -> RestructureResult<Option<Ledger>> {
        let bytes = self.source.read(&file.path).await?;
        let records = decode_records(&bytes, &file.range)?;
        if records.is_empty() {
            warn!(path = %file.path, "source file contains no records, not deleting");
            return Ok(None);
        }

        let mut ledger = Ledger::new();
        for (_, record) in &records {
            match self.check_record(record, file.last_modified).await? {
                Some(bin) => ledger.add_bin(bin, 1),
                None => return Ok(None),
            }
        }

        Ok(Some(ledger))
    }

    /// Resolves a record to its target file, rotating suffixes past
    /// schema-incompatible candidates. Returns the deletion bin when found.
    async fn check_record(
        &mut self,
        record: &Value,
        fallback_time: DateTime<Utc>,
    ) -> RestructureResult<Option<Bin>> {
        let mut suffix = 0;

        while suffix < MAX_SUFFIX {
            let organization =
                self.path_factory
                    .organize(&self.topic, record, suffix, Some(fallback_time))?;

            match self.cache.check(&organization.path, record).await? {
                TargetCheck::Found => {
                    return Ok(Some(Bin {
                        topic: self.topic.clone(),
                        device: organization.device,
                        category: DELETED_CATEGORY.to_string(),
                        time: organization.bucket,
                    }));
                }
                TargetCheck::BadSchema => {
                    suffix += 1;
                }
                TargetCheck::NotFound | TargetCheck::FileNotFound => return Ok(None),
            }
        }

        Ok(None)
    }
}
