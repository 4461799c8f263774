//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::path::Path;

use apache_avro::Schema;
use apache_avro::Writer;
use apache_avro::types::Value;
use restructure_config::shared::{
    RestructureConfig, SourceConfig, StorageConfig, TargetConfig, WorkerConfig,
};

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

pub const HOUR_NANOS: i64 = 3_600_000_000_000;

/// Builds an observation record keyed to the default test identity.
pub fn record_at(time_nanos: i64) -> Value {
    Value::Record(vec![
        (
            "key".to_string(),
            Value::Record(vec![
                ("projectId".to_string(), Value::String("radar".to_string())),
                ("userId".to_string(), Value::String("u1".to_string())),
                ("sourceId".to_string(), Value::String("s1".to_string())),
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

/// Writes a landing-zone Avro file named for the given offset range.
pub fn write_landing_file(
    source_root: &Path,
    topic: &str,
    partition: i32,
    from: i64,
    records: &[Value],
) {
    let to = from + (records.len() as i64 - 1).max(0);
    let schema = Schema::parse_str(OBSERVATION_SCHEMA).expect("schema parses");
    let mut writer = Writer::new(&schema, Vec::new());
    for record in records {
        writer.append(record.clone()).expect("record matches schema");
    }
    let bytes = writer.into_inner().expect("container finalizes");

    let dir = source_root.join(topic);
    std::fs::create_dir_all(&dir).expect("topic directory");
    std::fs::write(
        dir.join(format!("{topic}+{partition}+{from}+{to}.avro")),
        bytes,
    )
    .expect("landing file written");
}

/// Configuration for a local-to-local run with immediate file eligibility.
pub fn local_config(source_root: &Path, target_root: &Path, tmp_dir: &Path) -> RestructureConfig {
    RestructureConfig {
        source: SourceConfig {
            storage: StorageConfig::Local {
                root: source_root.display().to_string(),
            },
            paths: vec![String::new()],
        },
        target: TargetConfig {
            storage: StorageConfig::Local {
                root: target_root.display().to_string(),
            },
        },
        format: Default::default(),
        topics: Default::default(),
        workers: WorkerConfig {
            min_file_age_secs: 0,
            tmp_dir: tmp_dir.to_path_buf(),
            ..Default::default()
        },
        service: Default::default(),
        cleaner: Default::default(),
        coordination: None,
        path_factory: "observationKey".to_string(),
    }
}
