//! Record serialization formats for output files.
//!
//! A converter owns the compressed writer of one staged output file. It may
//! refuse a record whose shape does not match the file (CSV header mismatch),
//! which the caller resolves by rotating the path suffix.

mod csv_format;
mod flatten;
mod json_format;

pub use csv_format::CsvConverter;
pub use flatten::{flatten_record, flattened_keys};
pub use json_format::JsonConverter;

use std::collections::HashSet;
use std::path::Path;

use apache_avro::types::Value;
use restructure_config::shared::{CompressionKind, DeduplicationConfig, FormatKind};

use crate::compression::{CompressedWriter, decompress};
use crate::error::{ErrorKind, RestructureResult};
use crate::restructure_error;

/// Serializer for one output file in the configured format.
pub enum RecordConverter {
    Csv(CsvConverter),
    Json(JsonConverter),
}

impl RecordConverter {
    /// Builds a converter over a freshly opened compressed writer.
    ///
    /// `existing` is the decompressed content of a pre-existing target file;
    /// its rows are carried over into the new writer. Returns `None` when the
    /// example record is not compatible with the existing content, in which
    /// case the caller should retry under the next path suffix.
    pub fn create(
        kind: FormatKind,
        writer: CompressedWriter,
        example: &Value,
        existing: Option<&[u8]>,
    ) -> RestructureResult<Option<Self>> {
        match kind {
            FormatKind::Csv => {
                Ok(CsvConverter::create(writer, example, existing)?.map(RecordConverter::Csv))
            }
            FormatKind::Json => {
                Ok(Some(RecordConverter::Json(JsonConverter::create(
                    writer, existing,
                )?)))
            }
        }
    }

    /// Serializes one record. Returns false when the record's shape does not
    /// fit this file.
    pub fn write_record(&mut self, record: &Value) -> RestructureResult<bool> {
        match self {
            RecordConverter::Csv(converter) => converter.write_record(record),
            RecordConverter::Json(converter) => converter.write_record(record),
        }
    }

    /// Flushes buffered rows into the compressed stream.
    pub fn flush(&mut self) -> RestructureResult<()> {
        match self {
            RecordConverter::Csv(converter) => converter.flush(),
            RecordConverter::Json(converter) => converter.flush(),
        }
    }

    /// Finalizes the file, writing any codec trailer.
    pub fn finish(self) -> RestructureResult<()> {
        match self {
            RecordConverter::Csv(converter) => converter.finish(),
            RecordConverter::Json(converter) => converter.finish(),
        }
    }
}

/// Parsed view of a published target file, as needed by the cleaner.
#[derive(Debug, Default)]
pub struct TargetScan {
    /// CSV header when the target is CSV; `None` for JSON targets.
    pub csv_header: Option<Vec<String>>,
    /// All record timestamps (`value.time` nanoseconds) present in the file.
    pub timestamps: HashSet<i64>,
}

/// Scans a decompressed target file for its header and record timestamps.
pub fn scan_target(kind: FormatKind, content: &[u8]) -> RestructureResult<TargetScan> {
    match kind {
        FormatKind::Csv => csv_format::scan(content),
        FormatKind::Json => json_format::scan(content),
    }
}

/// Deduplicates a staged output file in place.
///
/// Rows are stable-sorted by their identity projection and collapsed to the
/// first occurrence per identity, then the file is rewritten through the same
/// compression codec.
pub fn deduplicate_file(
    kind: FormatKind,
    compression: CompressionKind,
    staged: &Path,
    entry_name: &str,
    dedup: &DeduplicationConfig,
) -> RestructureResult<()> {
    let bytes = std::fs::read(staged)?;
    let content = decompress(compression, &bytes).map_err(|err| {
        restructure_error!(
            ErrorKind::StagingIo,
            "failed to re-read staged file for deduplication"
        )
        .with_source(err)
    })?;

    let deduplicated = match kind {
        FormatKind::Csv => csv_format::deduplicate(&content, dedup)?,
        FormatKind::Json => json_format::deduplicate(&content, dedup)?,
    };

    let file = std::fs::File::create(staged)?;
    let mut writer = CompressedWriter::new(compression, file, entry_name)?;
    std::io::Write::write_all(&mut writer, &deduplicated)?;
    writer.finish()?;

    Ok(())
}
