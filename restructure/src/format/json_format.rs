use std::collections::HashSet;
use std::io::Write;

use apache_avro::types::Value;
use restructure_config::shared::DeduplicationConfig;

use crate::compression::CompressedWriter;
use crate::error::{ErrorKind, RestructureResult};
use crate::format::TargetScan;
use crate::restructure_error;

/// Line-delimited JSON serializer.
///
/// JSON carries its own structure per line, so any record shape is accepted
/// and appends never need a schema check.
pub struct JsonConverter {
    writer: CompressedWriter,
}

impl JsonConverter {
    /// Builds a converter, carrying existing content over verbatim.
    pub fn create(
        mut writer: CompressedWriter,
        existing: Option<&[u8]>,
    ) -> RestructureResult<Self> {
        if let Some(content) = existing {
            writer.write_all(content)?;
            if !content.is_empty() && !content.ends_with(b"\n") {
                writer.write_all(b"\n")?;
            }
        }

        Ok(Self { writer })
    }

    pub fn write_record(&mut self, record: &Value) -> RestructureResult<bool> {
        let json = serde_json::Value::try_from(record.clone()).map_err(|err| {
            restructure_error!(
                ErrorKind::MalformedRecord,
                "record cannot be rendered as json"
            )
            .with_source(err)
        })?;

        serde_json::to_writer(&mut self.writer, &json).map_err(|err| {
            restructure_error!(ErrorKind::StagingIo, "failed to write json row").with_source(err)
        })?;
        self.writer.write_all(b"\n")?;

        Ok(true)
    }

    pub fn flush(&mut self) -> RestructureResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn finish(self) -> RestructureResult<()> {
        self.writer.finish()?;
        Ok(())
    }
}

/// Scans decompressed JSON lines for record timestamps.
pub(super) fn scan(content: &[u8]) -> RestructureResult<TargetScan> {
    let mut timestamps = HashSet::new();

    for line in content.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let parsed: serde_json::Value = serde_json::from_slice(line).map_err(|err| {
            restructure_error!(ErrorKind::CorruptTarget, "existing json target is unreadable")
                .with_source(err)
        })?;
        if let Some(nanos) = parsed
            .pointer("/value/time")
            .or_else(|| parsed.pointer("/value/timeReceived"))
            .and_then(|v| v.as_i64())
        {
            timestamps.insert(nanos);
        }
    }

    Ok(TargetScan {
        csv_header: None,
        timestamps,
    })
}

/// Stable-sorts lines by their identity projection and keeps the first line
/// of each identity.
pub(super) fn deduplicate(
    content: &[u8],
    dedup: &DeduplicationConfig,
) -> RestructureResult<Vec<u8>> {
    let mut rows: Vec<(String, String)> = Vec::new();

    for line in content.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let parsed: serde_json::Value = serde_json::from_slice(line).map_err(|err| {
            restructure_error!(ErrorKind::StagingIo, "staged json row is unreadable")
                .with_source(err)
        })?;
        let identity = identity_of(&parsed, dedup);
        rows.push((identity, String::from_utf8_lossy(line).into_owned()));
    }

    rows.sort_by(|(a, _), (b, _)| a.cmp(b));
    rows.dedup_by(|(a, _), (b, _)| a == b);

    let mut output = Vec::with_capacity(content.len());
    for (_, line) in rows {
        output.extend_from_slice(line.as_bytes());
        output.push(b'\n');
    }

    Ok(output)
}

fn identity_of(row: &serde_json::Value, dedup: &DeduplicationConfig) -> String {
    if !dedup.distinct_fields.is_empty() {
        let projected: Vec<serde_json::Value> = dedup
            .distinct_fields
            .iter()
            .map(|field| {
                row.pointer(&dotted_to_pointer(field))
                    .cloned()
                    .unwrap_or(serde_json::Value::Null)
            })
            .collect();
        return serde_json::Value::Array(projected).to_string();
    }

    let mut reduced = row.clone();
    for field in &dedup.ignore_fields {
        remove_path(&mut reduced, field);
    }
    reduced.to_string()
}

fn dotted_to_pointer(field: &str) -> String {
    format!("/{}", field.replace('.', "/"))
}

fn remove_path(value: &mut serde_json::Value, field: &str) {
    let mut segments = field.split('.').peekable();
    let mut current = value;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            if let Some(object) = current.as_object_mut() {
                object.remove(segment);
            }
            return;
        }
        match current.get_mut(segment) {
            Some(next) => current = next,
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_reads_nested_time() {
        let content = b"{\"key\":{\"sourceId\":\"s\"},\"value\":{\"time\":5}}\n{\"value\":{\"time\":7}}\n";
        let scan = scan(content).unwrap();

        assert!(scan.csv_header.is_none());
        assert!(scan.timestamps.contains(&5));
        assert!(scan.timestamps.contains(&7));
    }

    #[test]
    fn deduplicate_on_distinct_fields() {
        let content = b"{\"value\":{\"time\":1,\"x\":0.5}}\n{\"value\":{\"time\":1,\"x\":0.9}}\n{\"value\":{\"time\":2,\"x\":0.5}}\n";
        let dedup = DeduplicationConfig {
            enable: true,
            distinct_fields: vec!["value.time".to_string()],
            ignore_fields: vec![],
        };

        let output = deduplicate(content, &dedup).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("0.5"));
        assert!(!text.contains("0.9"));
    }

    #[test]
    fn deduplicate_whole_rows_ignoring_fields() {
        let content =
            b"{\"value\":{\"time\":1,\"x\":0.5}}\n{\"value\":{\"time\":1,\"x\":0.6}}\n";
        let dedup = DeduplicationConfig {
            enable: true,
            distinct_fields: vec![],
            ignore_fields: vec!["value.x".to_string()],
        };

        let output = deduplicate(content, &dedup).unwrap();
        assert_eq!(String::from_utf8(output).unwrap().lines().count(), 1);
    }
}
