use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::accounting::durable::DurableFile;
use crate::accounting::{
    BinTable, Ledger, OffsetRangeSet, parse_bins, parse_offsets, render_bin_rows, render_bins,
    render_offset_rows, render_offsets,
};
use crate::error::{ErrorKind, RestructureResult};
use crate::restructure_error;
use crate::storage::StorageDriver;
use crate::types::OffsetRange;

/// Authoritative offsets file, relative to the target storage root.
const OFFSETS_FILE: &str = "offsets.csv";

/// Authoritative bins file, relative to the target storage root.
const BINS_FILE: &str = "bins.csv";

struct AccountantState {
    offsets: OffsetRangeSet,
    bins: BinTable,
}

/// Durable bookkeeping of processed offset ranges and hourly bin counters.
///
/// Shared by all workers. State lives in memory under a mutex; persistence is
/// delegated to one background writer per file, so `process` never blocks on
/// target storage beyond queueing.
pub struct Accountant<S: StorageDriver> {
    state: Mutex<AccountantState>,
    offsets_file: Option<DurableFile>,
    bins_file: Option<DurableFile>,
    // Held for its lifetime: the scratch directory is removed when the
    // accountant is dropped.
    _temp_dir: TempDir,
    _storage: Arc<S>,
}

impl<S: StorageDriver> Accountant<S> {
    /// Reads the persisted state back from target storage and starts the
    /// durable writers. `tmp_dir` hosts this run's scratch directory.
    pub async fn new(storage: Arc<S>, tmp_dir: &Path) -> RestructureResult<Self> {
        let offsets = match storage.exists(OFFSETS_FILE).await? {
            true => parse_offsets(&storage.read(OFFSETS_FILE).await?)?,
            false => OffsetRangeSet::new(),
        };
        let bins = match storage.exists(BINS_FILE).await? {
            true => parse_bins(&storage.read(BINS_FILE).await?)?,
            false => BinTable::new(),
        };

        info!(
            offset_intervals = offsets.iter().count(),
            bin_rows = bins.len(),
            "accountant state recovered from target storage"
        );

        let temp_dir = tempfile::Builder::new()
            .prefix("accounting-")
            .tempdir_in(tmp_dir)
            .map_err(|err| {
                restructure_error!(
                    ErrorKind::InvalidConfiguration,
                    "failed to create accounting scratch directory"
                )
                .with_source(err)
            })?;

        let offsets_file = DurableFile::spawn(
            storage.clone(),
            OFFSETS_FILE.to_string(),
            temp_dir.path().join("offsets.scratch"),
        );
        let bins_file = DurableFile::spawn(
            storage.clone(),
            BINS_FILE.to_string(),
            temp_dir.path().join("bins.scratch"),
        );

        Ok(Self {
            state: Mutex::new(AccountantState { offsets, bins }),
            offsets_file: Some(offsets_file),
            bins_file: Some(bins_file),
            _temp_dir: temp_dir,
            _storage: storage,
        })
    }

    /// Merges a worker's ledger into the durable state.
    ///
    /// The in-memory merge happens atomically under the state mutex; both
    /// files then get the ledger rows appended and a snapshot rewrite queued.
    pub async fn process(&self, ledger: Ledger) -> RestructureResult<()> {
        if ledger.is_empty() {
            return Ok(());
        }

        let (offset_rows, bin_rows, offsets_snapshot, bins_snapshot) = {
            let mut state = self.state.lock().await;
            state.offsets.add_all(ledger.offsets());
            for (bin, count) in ledger.bins() {
                *state.bins.entry(bin.clone()).or_insert(0) += count;
            }

            (
                render_offset_rows(ledger.offsets()),
                render_bin_rows(ledger.bins()),
                render_offsets(&state.offsets),
                render_bins(&state.bins),
            )
        };

        let offsets_file = self.offsets_file()?;
        let bins_file = self.bins_file()?;

        offsets_file.append(offset_rows).await?;
        offsets_file.rewrite(offsets_snapshot).await?;
        bins_file.append(bin_rows).await?;
        bins_file.rewrite(bins_snapshot).await?;

        Ok(())
    }

    /// Whether the given range is already fully accounted for.
    pub async fn contains(&self, range: &OffsetRange) -> bool {
        self.state.lock().await.offsets.contains(range)
    }

    /// Snapshot of the current offset set, for reporting and tests.
    pub async fn offsets(&self) -> OffsetRangeSet {
        self.state.lock().await.offsets.clone()
    }

    /// Blocks until all queued writes have reached target storage.
    pub async fn flush(&self) -> RestructureResult<()> {
        self.offsets_file()?.flush().await?;
        self.bins_file()?.flush().await?;
        Ok(())
    }

    /// Flushes, stops the durable writers and releases the scratch directory.
    pub async fn close(mut self) -> RestructureResult<()> {
        let mut result = Ok(());
        if let Some(file) = self.offsets_file.take()
            && let Err(err) = file.close().await
        {
            warn!(error = %err, "failed to close offsets writer");
            result = Err(err);
        }
        if let Some(file) = self.bins_file.take()
            && let Err(err) = file.close().await
        {
            warn!(error = %err, "failed to close bins writer");
            result = Err(err);
        }

        result
    }

    fn offsets_file(&self) -> RestructureResult<&DurableFile> {
        self.offsets_file.as_ref().ok_or_else(|| {
            restructure_error!(ErrorKind::InvalidState, "accountant already closed")
        })
    }

    fn bins_file(&self) -> RestructureResult<&DurableFile> {
        self.bins_file.as_ref().ok_or_else(|| {
            restructure_error!(ErrorKind::InvalidState, "accountant already closed")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::{Bin, Transaction};
    use crate::storage::LocalStorage;
    use crate::types::TopicPartition;
    use tempfile::TempDir;

    fn transaction(offset: i64) -> Transaction {
        Transaction {
            topic_partition: TopicPartition::new("t", 0),
            offset,
            bin: Bin {
                topic: "t".to_string(),
                device: "s1".to_string(),
                category: "written".to_string(),
                time: "20240101_00".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn process_persists_offsets_and_bins() {
        let target = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(target.path()));

        let accountant = Accountant::new(storage.clone(), tmp.path()).await.unwrap();

        let mut ledger = Ledger::new();
        ledger.add(transaction(0));
        ledger.add(transaction(1));
        accountant.process(ledger).await.unwrap();
        accountant.flush().await.unwrap();

        let offsets = std::fs::read_to_string(target.path().join("offsets.csv")).unwrap();
        assert!(offsets.contains("0,1,0,t"));
        let bins = std::fs::read_to_string(target.path().join("bins.csv")).unwrap();
        assert!(bins.contains("t,s1,written,20240101_00,2"));

        accountant.close().await.unwrap();
    }

    #[tokio::test]
    async fn state_survives_restart() {
        let target = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(target.path()));

        {
            let accountant = Accountant::new(storage.clone(), tmp.path()).await.unwrap();
            let mut ledger = Ledger::new();
            ledger.add(transaction(5));
            accountant.process(ledger).await.unwrap();
            accountant.close().await.unwrap();
        }

        let accountant = Accountant::new(storage.clone(), tmp.path()).await.unwrap();
        let range = OffsetRange::new(TopicPartition::new("t", 0), 5, 5);
        assert!(accountant.contains(&range).await);
        accountant.close().await.unwrap();
    }

    #[tokio::test]
    async fn empty_ledger_is_a_no_op() {
        let target = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(target.path()));

        let accountant = Accountant::new(storage.clone(), tmp.path()).await.unwrap();
        accountant.process(Ledger::new()).await.unwrap();
        accountant.flush().await.unwrap();

        assert!(!target.path().join("offsets.csv").exists());
        accountant.close().await.unwrap();
    }
}
