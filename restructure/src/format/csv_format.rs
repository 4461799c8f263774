use std::collections::HashSet;

use apache_avro::types::Value;
use restructure_config::shared::DeduplicationConfig;

use crate::compression::CompressedWriter;
use crate::error::{ErrorKind, RestructureResult};
use crate::format::flatten::flatten_record;
use crate::format::TargetScan;
use crate::restructure_error;

/// Column holding the record timestamp in flattened output.
const TIME_COLUMN: &str = "value.time";

/// CSV serializer with a header fixed at file creation.
///
/// A record fits the file only when its flattened keys equal the header
/// exactly; anything else is a schema mismatch and the record is refused.
pub struct CsvConverter {
    writer: csv::Writer<CompressedWriter>,
    header: Vec<String>,
}

impl CsvConverter {
    /// Builds a converter, emitting the header for new files and carrying
    /// existing rows over for appends.
    ///
    /// Returns `None` when the example record does not match the existing
    /// file's header. Unparseable existing content is a corrupt target.
    pub fn create(
        writer: CompressedWriter,
        example: &Value,
        existing: Option<&[u8]>,
    ) -> RestructureResult<Option<Self>> {
        let example_keys: Vec<String> = flatten_record(example)
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        let mut writer = csv::Writer::from_writer(writer);

        let header = match existing {
            Some(content) => {
                let mut reader = csv::Reader::from_reader(content);
                let existing_header: Vec<String> = reader
                    .headers()
                    .map_err(corrupt_target)?
                    .iter()
                    .map(|field| field.to_string())
                    .collect();

                if existing_header != example_keys {
                    return Ok(None);
                }

                writer
                    .write_record(&existing_header)
                    .map_err(write_failed)?;
                for row in reader.records() {
                    let row = row.map_err(corrupt_target)?;
                    writer.write_record(&row).map_err(write_failed)?;
                }

                existing_header
            }
            None => {
                writer.write_record(&example_keys).map_err(write_failed)?;
                example_keys
            }
        };

        Ok(Some(Self { writer, header }))
    }

    /// Writes one record, refusing shapes that do not match the header.
    pub fn write_record(&mut self, record: &Value) -> RestructureResult<bool> {
        let fields = flatten_record(record);
        if fields.len() != self.header.len()
            || fields.iter().zip(&self.header).any(|((key, _), col)| key != col)
        {
            return Ok(false);
        }

        self.writer
            .write_record(fields.iter().map(|(_, value)| value.as_str()))
            .map_err(write_failed)?;

        Ok(true)
    }

    pub fn flush(&mut self) -> RestructureResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn finish(mut self) -> RestructureResult<()> {
        self.writer.flush()?;
        let compressed = self.writer.into_inner().map_err(|err| {
            restructure_error!(ErrorKind::StagingIo, "failed to finalize csv writer")
                .with_source(err)
        })?;
        compressed.finish()?;
        Ok(())
    }
}

/// Scans a decompressed CSV target for its header and timestamp column.
pub(super) fn scan(content: &[u8]) -> RestructureResult<TargetScan> {
    let mut reader = csv::Reader::from_reader(content);
    let header: Vec<String> = reader
        .headers()
        .map_err(corrupt_target)?
        .iter()
        .map(|field| field.to_string())
        .collect();

    let time_index = header.iter().position(|column| column == TIME_COLUMN);
    let mut timestamps = HashSet::new();
    if let Some(index) = time_index {
        for row in reader.records() {
            let row = row.map_err(corrupt_target)?;
            if let Some(nanos) = row.get(index).and_then(|f| f.parse::<i64>().ok()) {
                timestamps.insert(nanos);
            }
        }
    }

    Ok(TargetScan {
        csv_header: Some(header),
        timestamps,
    })
}

/// Stable-sorts rows by their identity projection and keeps the first row of
/// each identity.
pub(super) fn deduplicate(
    content: &[u8],
    dedup: &DeduplicationConfig,
) -> RestructureResult<Vec<u8>> {
    let mut reader = csv::Reader::from_reader(content);
    let header: Vec<String> = reader
        .headers()
        .map_err(corrupt_target)?
        .iter()
        .map(|field| field.to_string())
        .collect();

    let identity_indexes: Vec<usize> = if dedup.distinct_fields.is_empty() {
        header
            .iter()
            .enumerate()
            .filter(|(_, column)| !dedup.ignore_fields.contains(column))
            .map(|(index, _)| index)
            .collect()
    } else {
        header
            .iter()
            .enumerate()
            .filter(|(_, column)| dedup.distinct_fields.contains(column))
            .map(|(index, _)| index)
            .collect()
    };

    let mut rows: Vec<Vec<String>> = Vec::new();
    for row in reader.records() {
        let row = row.map_err(corrupt_target)?;
        rows.push(row.iter().map(|field| field.to_string()).collect());
    }

    let identity = |row: &Vec<String>| -> Vec<String> {
        identity_indexes
            .iter()
            .filter_map(|&index| row.get(index).cloned())
            .collect()
    };

    rows.sort_by_key(&identity);
    rows.dedup_by_key(|row| identity(row));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header).map_err(write_failed)?;
    for row in rows {
        writer.write_record(&row).map_err(write_failed)?;
    }
    writer.flush()?;

    writer.into_inner().map_err(|err| {
        restructure_error!(ErrorKind::StagingIo, "failed to finalize deduplicated csv")
            .with_source(err)
    })
}

fn corrupt_target(err: csv::Error) -> crate::error::RestructureError {
    restructure_error!(ErrorKind::CorruptTarget, "existing csv target is unreadable")
        .with_source(err)
}

fn write_failed(err: csv::Error) -> crate::error::RestructureError {
    restructure_error!(ErrorKind::StagingIo, "failed to write csv row").with_source(err)
}
