//! Decoding of landing-zone Avro container files.

use apache_avro::Reader;
use apache_avro::types::Value;
use tracing::warn;

use crate::error::{ErrorKind, RestructureResult};
use crate::restructure_error;
use crate::types::OffsetRange;

/// Decodes all records of a source file, pairing each with its offset.
///
/// Offsets are assigned as `range.from + index` in stream order, matching how
/// the sink numbered the records when it wrote the file. A record count that
/// disagrees with the file's offset range is logged but not fatal; the range
/// in the name wins for accounting purposes.
pub fn decode_records(bytes: &[u8], range: &OffsetRange) -> RestructureResult<Vec<(i64, Value)>> {
    let reader = Reader::new(bytes).map_err(|err| {
        restructure_error!(
            ErrorKind::CorruptSource,
            "failed to open avro container",
            range
        )
        .with_source(err)
    })?;

    let mut records = Vec::new();
    for (index, record) in reader.enumerate() {
        let record = record.map_err(|err| {
            restructure_error!(
                ErrorKind::CorruptSource,
                "failed to decode avro record",
                format!("{range} at index {index}")
            )
            .with_source(err)
        })?;
        records.push((range.from_offset() + index as i64, record));
    }

    let expected = (range.to_offset() - range.from_offset() + 1) as usize;
    if !records.is_empty() && records.len() != expected {
        warn!(
            range = %range,
            records = records.len(),
            expected,
            "record count does not match file offset range"
        );
    }

    Ok(records)
}
