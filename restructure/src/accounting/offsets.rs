use crate::accounting::OffsetRangeSet;
use crate::error::{ErrorKind, RestructureResult};
use crate::restructure_error;
use crate::types::{OffsetRange, TopicPartition};

/// Header of the durable offsets file.
const OFFSETS_HEADER: [&str; 4] = ["offsetFrom", "offsetTo", "partition", "topic"];

/// Renders the full offsets snapshot, header included.
pub(crate) fn render_offsets(set: &OffsetRangeSet) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    // Writing to a Vec cannot fail.
    let _ = writer.write_record(OFFSETS_HEADER);
    for range in set.iter() {
        let _ = writer.write_record(offset_fields(&range));
    }

    into_string(writer)
}

/// Renders one CSV row per interval, without the header, for scratch appends.
pub(crate) fn render_offset_rows(set: &OffsetRangeSet) -> Vec<String> {
    set.iter()
        .map(|range| {
            let mut writer = csv::Writer::from_writer(Vec::new());
            let _ = writer.write_record(offset_fields(&range));
            into_string(writer).trim_end().to_string()
        })
        .collect()
}

/// Parses a previously rendered offsets snapshot.
pub(crate) fn parse_offsets(content: &[u8]) -> RestructureResult<OffsetRangeSet> {
    let mut reader = csv::Reader::from_reader(content);
    let mut set = OffsetRangeSet::new();

    for record in reader.records() {
        let record = record.map_err(|err| {
            restructure_error!(ErrorKind::AccountantReadFailed, "malformed offsets row")
                .with_source(err)
        })?;
        let row_error = || {
            restructure_error!(
                ErrorKind::AccountantReadFailed,
                "malformed offsets row",
                record.iter().collect::<Vec<_>>().join(",")
            )
        };

        let from = record
            .get(0)
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(row_error)?;
        let to = record
            .get(1)
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(row_error)?;
        let partition = record
            .get(2)
            .and_then(|f| f.parse::<i32>().ok())
            .ok_or_else(row_error)?;
        let topic = record.get(3).filter(|t| !t.is_empty()).ok_or_else(row_error)?;

        if from > to {
            return Err(row_error());
        }

        set.add(&OffsetRange::new(
            TopicPartition::new(topic, partition),
            from,
            to,
        ));
    }

    Ok(set)
}

fn offset_fields(range: &OffsetRange) -> [String; 4] {
    [
        range.from_offset().to_string(),
        range.to_offset().to_string(),
        range.topic_partition().partition().to_string(),
        range.topic_partition().topic().to_string(),
    ]
}

fn into_string(writer: csv::Writer<Vec<u8>>) -> String {
    String::from_utf8(writer.into_inner().unwrap_or_default()).unwrap_or_default()
}
