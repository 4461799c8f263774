use std::collections::HashMap;

use crate::accounting::ledger::Bin;
use crate::error::{ErrorKind, RestructureResult};
use crate::restructure_error;

/// Header of the durable bins file.
const BINS_HEADER: [&str; 5] = ["topic", "device", "category", "time", "count"];

/// Accumulated hourly counters, the in-memory form of `bins.csv`.
pub type BinTable = HashMap<Bin, i64>;

/// Renders the full bins snapshot, header included, sorted for stable output.
pub(crate) fn render_bins(bins: &BinTable) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let _ = writer.write_record(BINS_HEADER);

    let mut entries: Vec<_> = bins.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    for (bin, count) in entries {
        let _ = writer.write_record(bin_fields(bin, *count));
    }

    into_string(writer)
}

/// Renders one CSV row per bin, without the header, for scratch appends.
pub(crate) fn render_bin_rows(bins: &BinTable) -> Vec<String> {
    let mut entries: Vec<_> = bins.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));

    entries
        .into_iter()
        .map(|(bin, count)| {
            let mut writer = csv::Writer::from_writer(Vec::new());
            let _ = writer.write_record(bin_fields(bin, *count));
            into_string(writer).trim_end().to_string()
        })
        .collect()
}

/// Parses a previously rendered bins snapshot.
pub(crate) fn parse_bins(content: &[u8]) -> RestructureResult<BinTable> {
    let mut reader = csv::Reader::from_reader(content);
    let mut bins = BinTable::new();

    for record in reader.records() {
        let record = record.map_err(|err| {
            restructure_error!(ErrorKind::AccountantReadFailed, "malformed bins row")
                .with_source(err)
        })?;
        let row_error = || {
            restructure_error!(
                ErrorKind::AccountantReadFailed,
                "malformed bins row",
                record.iter().collect::<Vec<_>>().join(",")
            )
        };

        let topic = record.get(0).ok_or_else(row_error)?;
        let device = record.get(1).ok_or_else(row_error)?;
        let category = record.get(2).ok_or_else(row_error)?;
        let time = record.get(3).ok_or_else(row_error)?;
        let count = record
            .get(4)
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(row_error)?;

        let bin = Bin {
            topic: topic.to_string(),
            device: device.to_string(),
            category: category.to_string(),
            time: time.to_string(),
        };
        *bins.entry(bin).or_insert(0) += count;
    }

    Ok(bins)
}

fn bin_fields(bin: &Bin, count: i64) -> [String; 5] {
    [
        bin.topic.clone(),
        bin.device.clone(),
        bin.category.clone(),
        bin.time.clone(),
        count.to_string(),
    ]
}

fn into_string(writer: csv::Writer<Vec<u8>>) -> String {
    String::from_utf8(writer.into_inner().unwrap_or_default()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(device: &str, time: &str) -> Bin {
        Bin {
            topic: "t".to_string(),
            device: device.to_string(),
            category: "written".to_string(),
            time: time.to_string(),
        }
    }

    #[test]
    fn round_trip_preserves_counts() {
        let mut bins = BinTable::new();
        bins.insert(bin("s1", "20240101_00"), 10);
        bins.insert(bin("s2", "20240101_01"), 3);

        let rendered = render_bins(&bins);
        let parsed = parse_bins(rendered.as_bytes()).unwrap();
        assert_eq!(parsed, bins);
    }

    #[test]
    fn duplicate_rows_accumulate() {
        let content = "topic,device,category,time,count\nt,s1,written,20240101_00,2\nt,s1,written,20240101_00,3\n";
        let parsed = parse_bins(content.as_bytes()).unwrap();
        assert_eq!(parsed.get(&bin("s1", "20240101_00")), Some(&5));
    }
}
