use std::path::Path;

use apache_avro::types::Value;
use restructure_config::shared::{CompressionKind, DeduplicationConfig, FormatKind};
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::accounting::{Accountant, Ledger, Transaction};
use crate::compression::{CompressedWriter, decompress};
use crate::error::{ErrorKind, RestructureResult};
use crate::format::{RecordConverter, deduplicate_file};
use crate::restructure_error;
use crate::storage::StorageDriver;

/// Maximum number of `.corrupted` rotations kept next to one target path.
/// Past this the corrupt file is deleted.
const MAX_CORRUPT_ROTATIONS: u32 = 100;

/// One open output file: a staged local temp file plus the converter and
/// ledger that belong to it.
///
/// The staged file is published atomically on an error-free close and simply
/// dropped otherwise; the ledger reaches the accountant only after a
/// successful publish.
pub struct OutputWriter {
    target_path: String,
    entry_name: String,
    staging: NamedTempFile,
    converter: Option<RecordConverter>,
    ledger: Ledger,
    has_error: bool,
    records_written: u64,
    format: FormatKind,
    compression: CompressionKind,
    dedup: DeduplicationConfig,
}

impl OutputWriter {
    /// Opens a writer for `target_path`, appending to existing content.
    ///
    /// An existing target that cannot be read back is rotated to a
    /// `.corrupted` name and the writer starts fresh. Returns `None` when the
    /// example record is incompatible with the existing content, in which
    /// case the caller retries under the next path suffix.
    #[allow(clippy::too_many_arguments)]
    pub async fn open<S: StorageDriver>(
        storage: &S,
        scratch_dir: &Path,
        target_path: &str,
        example: &Value,
        format: FormatKind,
        compression: CompressionKind,
        dedup: DeduplicationConfig,
    ) -> RestructureResult<Option<Self>> {
        let entry_name = entry_name_of(target_path, compression);

        let mut existing = None;
        if storage.exists(target_path).await? {
            let read_back = storage.read(target_path).await;
            match read_back.and_then(|bytes| decompress(compression, &bytes)) {
                Ok(content) => existing = Some(content),
                Err(err) if err.kind() == ErrorKind::CorruptTarget => {
                    rotate_corrupt(storage, target_path).await?;
                }
                Err(err) => return Err(err),
            }
        }

        let build = |existing: Option<&[u8]>| -> RestructureResult<Option<(NamedTempFile, RecordConverter)>> {
            let staging = tempfile::Builder::new()
                .prefix("restructure-")
                .tempfile_in(scratch_dir)?;
            let writer =
                CompressedWriter::new(compression, staging.reopen()?, &entry_name)?;
            Ok(RecordConverter::create(format, writer, example, existing)?
                .map(|converter| (staging, converter)))
        };

        let built = match build(existing.as_deref()) {
            Ok(built) => built,
            Err(err) if err.kind() == ErrorKind::CorruptTarget => {
                // The content decompressed but does not parse as the expected
                // format. Same treatment as a corrupt stream.
                rotate_corrupt(storage, target_path).await?;
                build(None)?
            }
            Err(err) => return Err(err),
        };

        Ok(built.map(|(staging, converter)| Self {
            target_path: target_path.to_string(),
            entry_name,
            staging,
            converter: Some(converter),
            ledger: Ledger::new(),
            has_error: false,
            records_written: 0,
            format,
            compression,
            dedup,
        }))
    }

    /// Serializes one record and stages its transaction.
    ///
    /// Returns false when the record does not fit this file's schema. I/O
    /// failures mark the writer as failed so close discards it.
    pub fn write_record(
        &mut self,
        record: &Value,
        transaction: Transaction,
    ) -> RestructureResult<bool> {
        let converter = self.converter.as_mut().ok_or_else(|| {
            restructure_error!(ErrorKind::InvalidState, "writer already closed")
        })?;

        match converter.write_record(record) {
            Ok(true) => {
                self.ledger.add(transaction);
                self.records_written += 1;
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(err) => {
                self.has_error = true;
                Err(err)
            }
        }
    }

    /// Flushes buffered rows into the staged file.
    pub fn flush(&mut self) -> RestructureResult<()> {
        if let Some(converter) = self.converter.as_mut() {
            converter.flush()?;
        }
        Ok(())
    }

    /// Target path this writer publishes to.
    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    /// Whether a write failure poisoned this writer.
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// Closes the writer: deduplicate, publish atomically, then commit the
    /// ledger. A poisoned writer discards its staged file and commits nothing.
    pub async fn close<S: StorageDriver>(
        mut self,
        storage: &S,
        accountant: &Accountant<S>,
    ) -> RestructureResult<()> {
        let converter = self.converter.take();

        if self.has_error {
            warn!(
                target_path = %self.target_path,
                "discarding staged output after write failure"
            );
            return Ok(());
        }

        if let Some(converter) = converter {
            if let Err(err) = converter.finish() {
                error!(target_path = %self.target_path, error = %err, "failed to finalize staged output");
                return Err(err);
            }
        }

        if self.dedup.enable {
            deduplicate_file(
                self.format,
                self.compression,
                self.staging.path(),
                &self.entry_name,
                &self.dedup,
            )?;
        }

        storage.store(self.staging.path(), &self.target_path).await?;
        debug!(
            target_path = %self.target_path,
            records = self.records_written,
            "published output file"
        );

        accountant.process(std::mem::take(&mut self.ledger)).await
    }

    /// Drops the writer without publishing, used when a freshly opened writer
    /// turns out not to fit its first record.
    pub fn discard(mut self) {
        self.converter.take();
        // The staged temp file is removed when `staging` drops.
    }
}

fn entry_name_of(target_path: &str, compression: CompressionKind) -> String {
    let file_name = target_path.rsplit('/').next().unwrap_or(target_path);
    file_name
        .strip_suffix(compression.extension())
        .unwrap_or(file_name)
        .to_string()
}

/// Moves a corrupt target aside as `<name>.corrupted`, `<name>.corrupted-1` …
/// up to the rotation cap, past which the corrupt file is deleted.
async fn rotate_corrupt<S: StorageDriver>(storage: &S, target_path: &str) -> RestructureResult<()> {
    for attempt in 0..MAX_CORRUPT_ROTATIONS {
        let candidate = if attempt == 0 {
            format!("{target_path}.corrupted")
        } else {
            format!("{target_path}.corrupted-{attempt}")
        };

        if !storage.exists(&candidate).await? {
            error!(
                target_path = target_path,
                rotated_to = %candidate,
                "existing target is corrupt, moving it aside and starting fresh"
            );
            return storage.rename(target_path, &candidate).await;
        }
    }

    error!(
        target_path = target_path,
        "corrupt target exceeded rotation cap, deleting it"
    );
    storage.delete(target_path).await
}
