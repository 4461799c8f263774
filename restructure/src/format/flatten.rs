use apache_avro::types::Value;

/// Flattens an Avro record into dotted-key string pairs, in schema order.
///
/// Nested records contribute `outer.inner` keys. Scalar values render as their
/// canonical string form, byte arrays as lowercase hex, and composite values
/// (arrays, maps) as JSON.
pub fn flatten_record(record: &Value) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    flatten_into(record, "", &mut fields);
    fields
}

/// The dotted keys a record flattens to, in schema order.
pub fn flattened_keys(record: &Value) -> Vec<String> {
    flatten_record(record).into_iter().map(|(key, _)| key).collect()
}

fn flatten_into(value: &Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Record(fields) => {
            for (name, field_value) in fields {
                let key = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                flatten_into(field_value, &key, out);
            }
        }
        Value::Union(_, inner) => flatten_into(inner, prefix, out),
        other => out.push((prefix.to_string(), render_scalar(other))),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Boolean(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Long(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::Double(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Enum(_, symbol) => symbol.clone(),
        Value::Bytes(bytes) | Value::Fixed(_, bytes) => hex_encode(bytes),
        Value::Date(n) => n.to_string(),
        Value::TimestampMillis(n) | Value::TimestampMicros(n) | Value::TimestampNanos(n) => {
            n.to_string()
        }
        Value::TimeMillis(n) => n.to_string(),
        Value::TimeMicros(n) => n.to_string(),
        other => {
            // Arrays, maps and the remaining logical types keep their JSON form.
            match serde_json::Value::try_from(other.clone()) {
                Ok(json) => json.to_string(),
                Err(_) => String::new(),
            }
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        encoded.push_str(&format!("{byte:02x}"));
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::Record(vec![
            (
                "key".to_string(),
                Value::Record(vec![
                    ("projectId".to_string(), Value::String("p".to_string())),
                    ("userId".to_string(), Value::String("u".to_string())),
                ]),
            ),
            (
                "value".to_string(),
                Value::Record(vec![
                    ("time".to_string(), Value::Long(42)),
                    ("x".to_string(), Value::Double(1.5)),
                    (
                        "tag".to_string(),
                        Value::Union(1, Box::new(Value::String("ok".to_string()))),
                    ),
                ]),
            ),
        ])
    }

    #[test]
    fn keys_are_dotted_in_schema_order() {
        assert_eq!(
            flattened_keys(&sample()),
            vec![
                "key.projectId",
                "key.userId",
                "value.time",
                "value.x",
                "value.tag"
            ]
        );
    }

    #[test]
    fn unions_flatten_transparently() {
        let fields = flatten_record(&sample());
        assert_eq!(fields[4], ("value.tag".to_string(), "ok".to_string()));
    }

    #[test]
    fn bytes_render_as_hex() {
        let record = Value::Record(vec![(
            "data".to_string(),
            Value::Bytes(vec![0x00, 0xff, 0x10]),
        )]);
        assert_eq!(
            flatten_record(&record),
            vec![("data".to_string(), "00ff10".to_string())]
        );
    }

    #[test]
    fn null_renders_empty() {
        let record = Value::Record(vec![(
            "missing".to_string(),
            Value::Union(0, Box::new(Value::Null)),
        )]);
        assert_eq!(
            flatten_record(&record),
            vec![("missing".to_string(), String::new())]
        );
    }
}
