//! Derives the output location of a record from its key and timestamp.

use apache_avro::types::Value;
use chrono::{DateTime, TimeZone, Utc};
use restructure_config::shared::{CompressionKind, FormatKind};

use crate::error::{ErrorKind, RestructureResult};
use crate::restructure_error;

/// Hour bucket format used in output file names and bins.
const BUCKET_FORMAT: &str = "%Y%m%d_%H";

/// Placeholder path segments for records with missing key fields.
const UNKNOWN_PROJECT: &str = "unknown-project";
const UNKNOWN_USER: &str = "unknown-user";
const UNKNOWN_SOURCE: &str = "unknown-source";

/// Where one record belongs in the output tree.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordOrganization {
    /// Output file path relative to the target storage root.
    pub path: String,
    /// Hour bucket the record falls into.
    pub bucket: String,
    /// Device (source id) taken from the record key.
    pub device: String,
}

/// Closed registry of path strategies.
///
/// Only the observation-key strategy is built in; the registry exists so a
/// configuration name maps to a statically known strategy instead of a
/// dynamically loaded class.
#[derive(Debug, Clone)]
pub enum PathFactory {
    ObservationKey(ObservationKeyPathFactory),
}

impl PathFactory {
    /// Looks up a strategy by its registry name.
    pub fn from_name(
        name: &str,
        format: FormatKind,
        compression: CompressionKind,
    ) -> RestructureResult<Self> {
        match name {
            "observationKey" => Ok(PathFactory::ObservationKey(
                ObservationKeyPathFactory::new(format, compression),
            )),
            other => Err(restructure_error!(
                ErrorKind::InvalidConfiguration,
                "unknown path factory",
                other
            )),
        }
    }

    /// Derives the output organization of a record.
    pub fn organize(
        &self,
        topic: &str,
        record: &Value,
        suffix: u32,
        fallback_time: Option<DateTime<Utc>>,
    ) -> RestructureResult<RecordOrganization> {
        match self {
            PathFactory::ObservationKey(factory) => {
                factory.organize(topic, record, suffix, fallback_time)
            }
        }
    }
}

/// Groups records as `<topic>/<project>/<user>/<source>/<bucket>`.
#[derive(Debug, Clone)]
pub struct ObservationKeyPathFactory {
    extension: String,
}

impl ObservationKeyPathFactory {
    pub fn new(format: FormatKind, compression: CompressionKind) -> Self {
        Self {
            extension: format!("{}{}", format.extension(), compression.extension()),
        }
    }

    fn organize(
        &self,
        topic: &str,
        record: &Value,
        suffix: u32,
        fallback_time: Option<DateTime<Utc>>,
    ) -> RestructureResult<RecordOrganization> {
        let key = record_field(record, "key");
        let project = key
            .and_then(|k| string_field(k, "projectId"))
            .unwrap_or_else(|| UNKNOWN_PROJECT.to_string());
        let user = key
            .and_then(|k| string_field(k, "userId"))
            .unwrap_or_else(|| UNKNOWN_USER.to_string());
        let device = key
            .and_then(|k| string_field(k, "sourceId"))
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

        let time = record_time(record).or(fallback_time).ok_or_else(|| {
            restructure_error!(
                ErrorKind::MalformedRecord,
                "record carries no usable timestamp",
                topic
            )
        })?;
        let bucket = time.format(BUCKET_FORMAT).to_string();

        let suffix_part = if suffix == 0 {
            String::new()
        } else {
            format!(".{suffix}")
        };
        let path = format!(
            "{topic}/{project}/{user}/{device}/{bucket}{suffix_part}.{}",
            self.extension
        );

        Ok(RecordOrganization {
            path,
            bucket,
            device,
        })
    }
}

/// Extracts the record's `value.time` as a UTC timestamp, falling back to
/// `value.timeReceived`. Times are nanoseconds since the epoch.
pub fn record_time(record: &Value) -> Option<DateTime<Utc>> {
    let value = record_field(record, "value")?;
    let nanos = long_field(value, "time").or_else(|| long_field(value, "timeReceived"))?;
    Some(Utc.timestamp_nanos(nanos))
}

/// Extracts the record's timestamp in raw nanoseconds, as persisted in the
/// output files. Used by the cleaner to match records against targets.
pub fn record_time_nanos(record: &Value) -> Option<i64> {
    let value = record_field(record, "value")?;
    long_field(value, "time").or_else(|| long_field(value, "timeReceived"))
}

fn record_field<'a>(record: &'a Value, name: &str) -> Option<&'a Value> {
    match unwrap_union(record) {
        Value::Record(fields) => fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| unwrap_union(value)),
        _ => None,
    }
}

fn string_field(record: &Value, name: &str) -> Option<String> {
    match record_field(record, name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Enum(_, s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn long_field(record: &Value, name: &str) -> Option<i64> {
    match record_field(record, name)? {
        Value::Long(n) => Some(*n),
        Value::Int(n) => Some(i64::from(*n)),
        Value::TimestampNanos(n) => Some(*n),
        Value::TimestampMicros(n) => n.checked_mul(1_000),
        Value::TimestampMillis(n) => n.checked_mul(1_000_000),
        _ => None,
    }
}

fn unwrap_union(value: &Value) -> &Value {
    match value {
        Value::Union(_, inner) => unwrap_union(inner),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::observation_record;

    fn factory() -> PathFactory {
        PathFactory::from_name("observationKey", FormatKind::Csv, CompressionKind::Gzip).unwrap()
    }

    #[test]
    fn path_contains_key_fields_and_bucket() {
        // 2024-01-01T00:30:00Z in nanoseconds.
        let record = observation_record("radar", "u1", "s1", 1_704_069_000_000_000_000);
        let organization = factory()
            .organize("acceleration", &record, 0, None)
            .unwrap();

        assert_eq!(
            organization.path,
            "acceleration/radar/u1/s1/20240101_00.csv.gz"
        );
        assert_eq!(organization.bucket, "20240101_00");
        assert_eq!(organization.device, "s1");
    }

    #[test]
    fn nonzero_suffix_lands_before_extension() {
        let record = observation_record("radar", "u1", "s1", 1_704_069_000_000_000_000);
        let organization = factory()
            .organize("acceleration", &record, 2, None)
            .unwrap();

        assert_eq!(
            organization.path,
            "acceleration/radar/u1/s1/20240101_00.2.csv.gz"
        );
    }

    #[test]
    fn missing_key_fields_fall_back_to_placeholders() {
        let record = Value::Record(vec![(
            "value".to_string(),
            Value::Record(vec![("time".to_string(), Value::Long(0))]),
        )]);
        let organization = factory().organize("t", &record, 0, None).unwrap();

        assert_eq!(
            organization.path,
            "t/unknown-project/unknown-user/unknown-source/19700101_00.csv.gz"
        );
    }

    #[test]
    fn missing_time_uses_fallback() {
        let record = Value::Record(vec![(
            "key".to_string(),
            Value::Record(vec![
                ("projectId".to_string(), Value::String("p".to_string())),
                ("userId".to_string(), Value::String("u".to_string())),
                ("sourceId".to_string(), Value::String("s".to_string())),
            ]),
        )]);
        let fallback = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let organization = factory().organize("t", &record, 0, Some(fallback)).unwrap();
        assert_eq!(organization.bucket, "20240601_12");
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(
            PathFactory::from_name("reflection", FormatKind::Csv, CompressionKind::None).is_err()
        );
    }
}
