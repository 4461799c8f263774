use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};

use crate::error::{ErrorKind, RestructureResult};
use crate::restructure_error;

/// A Kafka topic and partition pair.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TopicPartition {
    topic: String,
    partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }
}

impl Display for TopicPartition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// A closed span of offsets covered by one landing-zone file.
///
/// Source files are named `<topic>+<partition>+<from>+<to>` by the sink, with
/// both bounds inclusive.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct OffsetRange {
    topic_partition: TopicPartition,
    from_offset: i64,
    to_offset: i64,
}

impl OffsetRange {
    pub fn new(topic_partition: TopicPartition, from_offset: i64, to_offset: i64) -> Self {
        debug_assert!(from_offset <= to_offset);
        Self {
            topic_partition,
            from_offset,
            to_offset,
        }
    }

    /// Parses an offset range from a source file name, ignoring any extension.
    pub fn parse_file_name(file_name: &str) -> RestructureResult<Self> {
        let stem = file_name.split('.').next().unwrap_or(file_name);
        let error = || {
            restructure_error!(
                ErrorKind::InvalidFileName,
                "source file name does not match <topic>+<partition>+<from>+<to>",
                stem
            )
        };

        let mut parts = stem.rsplitn(4, '+');
        let to_offset = parts
            .next()
            .and_then(|p| p.parse::<i64>().ok())
            .ok_or_else(error)?;
        let from_offset = parts
            .next()
            .and_then(|p| p.parse::<i64>().ok())
            .ok_or_else(error)?;
        let partition = parts
            .next()
            .and_then(|p| p.parse::<i32>().ok())
            .ok_or_else(error)?;
        let topic = parts.next().filter(|t| !t.is_empty()).ok_or_else(error)?;

        if from_offset > to_offset {
            return Err(error());
        }

        Ok(Self::new(
            TopicPartition::new(topic, partition),
            from_offset,
            to_offset,
        ))
    }

    /// Renders the file-name stem for this range.
    pub fn file_name_stem(&self) -> String {
        format!(
            "{}+{}+{}+{}",
            self.topic_partition.topic(),
            self.topic_partition.partition(),
            self.from_offset,
            self.to_offset
        )
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        &self.topic_partition
    }

    pub fn from_offset(&self) -> i64 {
        self.from_offset
    }

    pub fn to_offset(&self) -> i64 {
        self.to_offset
    }
}

impl Display for OffsetRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, {}]",
            self.topic_partition, self.from_offset, self.to_offset
        )
    }
}

/// One discovered landing-zone file.
#[derive(Debug, Clone)]
pub struct TopicFile {
    /// Topic this file belongs to.
    pub topic: String,
    /// Path of the file relative to the source storage root.
    pub path: String,
    /// Offset range parsed from the file name.
    pub range: OffsetRange,
    /// Last modification time reported by the source storage.
    pub last_modified: DateTime<Utc>,
    /// Size in bytes.
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_round_trip() {
        let range = OffsetRange::new(TopicPartition::new("android_phone_acceleration", 2), 0, 999);
        let parsed = OffsetRange::parse_file_name(&format!("{}.avro", range.file_name_stem()))
            .expect("round trip");
        assert_eq!(parsed, range);
    }

    #[test]
    fn parse_ignores_extension() {
        let parsed = OffsetRange::parse_file_name("t+0+5+10.avro").unwrap();
        assert_eq!(parsed.topic_partition().topic(), "t");
        assert_eq!(parsed.from_offset(), 5);
        assert_eq!(parsed.to_offset(), 10);
    }

    #[test]
    fn parse_rejects_inverted_range() {
        assert!(OffsetRange::parse_file_name("t+0+10+5.avro").is_err());
    }

    #[test]
    fn parse_rejects_missing_parts() {
        assert!(OffsetRange::parse_file_name("t+0+10.avro").is_err());
        assert!(OffsetRange::parse_file_name("+1+2+3").is_err());
    }
}
