//! Shared helpers for unit and integration tests.

use apache_avro::Schema;
use apache_avro::Writer;
use apache_avro::types::Value;

use crate::accounting::{Bin, Transaction};
use crate::types::TopicPartition;

/// Avro schema of the test observation records, mirroring the shape the sink
/// writes: a record key with identity fields plus a measurement value.
const OBSERVATION_SCHEMA: &str = r#"
{
  "type": "record",
  "name": "Observation",
  "fields": [
    {
      "name": "key",
      "type": {
        "type": "record",
        "name": "ObservationKey",
        "fields": [
          {"name": "projectId", "type": "string"},
          {"name": "userId", "type": "string"},
          {"name": "sourceId", "type": "string"}
        ]
      }
    },
    {
      "name": "value",
      "type": {
        "type": "record",
        "name": "Measurement",
        "fields": [
          {"name": "time", "type": "long"},
          {"name": "x", "type": "double"}
        ]
      }
    }
  ]
}
"#;

/// Parses the observation schema used by test fixtures.
pub fn observation_schema() -> Schema {
    Schema::parse_str(OBSERVATION_SCHEMA).expect("observation schema parses")
}

/// Builds an observation record with the given key fields and timestamp in
/// nanoseconds since the epoch.
pub fn observation_record(project: &str, user: &str, source: &str, time_nanos: i64) -> Value {
    Value::Record(vec![
        (
            "key".to_string(),
            Value::Record(vec![
                ("projectId".to_string(), Value::String(project.to_string())),
                ("userId".to_string(), Value::String(user.to_string())),
                ("sourceId".to_string(), Value::String(source.to_string())),
            ]),
        ),
        (
            "value".to_string(),
            Value::Record(vec![
                ("time".to_string(), Value::Long(time_nanos)),
                ("x".to_string(), Value::Double(1.0)),
            ]),
        ),
    ])
}

/// Serializes records into an Avro container file.
pub fn write_avro_bytes(records: &[Value]) -> Vec<u8> {
    let schema = observation_schema();
    let mut writer = Writer::new(&schema, Vec::new());
    for record in records {
        writer.append(record.clone()).expect("record matches schema");
    }
    writer.into_inner().expect("avro container finalizes")
}

/// File name a sink would give a landing-zone file covering these offsets.
pub fn landing_file_name(topic: &str, partition: i32, from: i64, to: i64) -> String {
    format!("{topic}+{partition}+{from}+{to}.avro")
}

/// A minimal transaction for writer tests.
pub fn transaction_at(topic: &str, partition: i32, offset: i64) -> Transaction {
    Transaction {
        topic_partition: TopicPartition::new(topic, partition),
        offset,
        bin: Bin {
            topic: topic.to_string(),
            device: "s".to_string(),
            category: "written".to_string(),
            time: "19700101_00".to_string(),
        },
    }
}
