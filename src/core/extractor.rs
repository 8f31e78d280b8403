//! Schema-driven extraction of string records from exchange JSON frames.

use crate::core::types::{FlatRecord, JsonKeys, MultiRecord};
use serde_json::Value;
use tracing::{debug, error, warn};

/// Outcome of parsing one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Empty or unparseable payload
    Noise,
    /// The exchange's `{"code": .., "msg": ..}` error envelope
    ExchangeError { code: String, msg: String },
    Document(Value),
}

/// Parse a text frame, classifying noise and error envelopes.
pub fn parse_frame(text: &str) -> Frame {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(e) => {
            debug!("dropping unparseable frame: {}", e);
            return Frame::Noise;
        }
    };

    let is_empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if is_empty {
        return Frame::Noise;
    }

    if let (Some(code), Some(msg)) = (value.get("code"), value.get("msg")) {
        return Frame::ExchangeError {
            code: value_text(code).unwrap_or_default(),
            msg: value_text(msg).unwrap_or_default(),
        };
    }

    Frame::Document(value)
}

/// Parse a frame and keep only real documents, logging error envelopes.
pub fn document_from_frame(text: &str) -> Option<Value> {
    match parse_frame(text) {
        Frame::Noise => None,
        Frame::ExchangeError { code, msg } => {
            error!(code = %code, "exchange error: {}", msg);
            None
        }
        Frame::Document(value) => Some(value),
    }
}

/// Render a JSON scalar as text.
///
/// Numbers keep their original textual form, so prices and quantities are
/// never truncated or re-rounded.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn insert_field(record: &mut FlatRecord, key: &str, value: &Value) {
    match value_text(value) {
        Some(text) => {
            record.insert(key.to_string(), text);
        }
        None => warn!(key = %key, "unsupported JSON type for field, skipping"),
    }
}

/// Copy the listed fields of a JSON object into a flat record.
///
/// Fields absent from the object are left out.
pub fn extract_fields<'a, I>(document: &Value, keys: I) -> FlatRecord
where
    I: IntoIterator<Item = &'a String>,
{
    let mut record = FlatRecord::new();
    for key in keys {
        if let Some(value) = document.get(key.as_str()) {
            insert_field(&mut record, key, value);
        }
    }
    record
}

/// Same as [`extract_fields`] for static field lists.
pub fn extract_listed(document: &Value, keys: &[&str]) -> FlatRecord {
    let mut record = FlatRecord::new();
    for key in keys {
        if let Some(value) = document.get(*key) {
            insert_field(&mut record, key, value);
        }
    }
    record
}

/// Extract every top-level schema key into one flat record.
pub fn extract_flat(document: &Value, schema: &JsonKeys) -> FlatRecord {
    extract_fields(document, schema.iter().map(|(key, _)| key))
}

/// Extract a two-level record.
///
/// A top-level array yields one inner record per element, keyed by the
/// element's `array_key` value and filled from `schema[array_key]`.
/// A top-level object yields one inner record per schema key.
pub fn extract_multi(document: &Value, schema: &JsonKeys, array_key: Option<&str>) -> MultiRecord {
    match document {
        Value::Array(items) => extract_array(items, schema, array_key),
        Value::Object(_) => extract_object(document, schema),
        _ => {
            debug!("multi-value extraction needs an array or object");
            MultiRecord::new()
        }
    }
}

fn extract_array(items: &[Value], schema: &JsonKeys, array_key: Option<&str>) -> MultiRecord {
    let mut result = MultiRecord::new();

    let Some(array_key) = array_key else {
        warn!("array frame received but monitor has no array key");
        return result;
    };
    let Some(sub_keys) = schema.get(array_key) else {
        warn!(array_key = %array_key, "array key missing from schema");
        return result;
    };

    for item in items {
        let Some(outer) = item.get(array_key).and_then(value_text) else {
            debug!(array_key = %array_key, "array element without key, skipping");
            continue;
        };
        result.insert(outer, extract_fields(item, sub_keys));
    }

    result
}

fn extract_object(document: &Value, schema: &JsonKeys) -> MultiRecord {
    let mut result = MultiRecord::new();

    for (key, sub_keys) in schema.iter() {
        let Some(value) = document.get(key.as_str()) else {
            continue;
        };

        if sub_keys.is_empty() {
            let mut inner = FlatRecord::new();
            insert_field(&mut inner, key, value);
            if !inner.is_empty() {
                result.insert(key.clone(), inner);
            }
        } else if value.is_object() {
            result.insert(key.clone(), extract_fields(value, sub_keys));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_frame_noise() {
        assert_eq!(parse_frame(""), Frame::Noise);
        assert_eq!(parse_frame("not json"), Frame::Noise);
        assert_eq!(parse_frame("{}"), Frame::Noise);
        assert_eq!(parse_frame("[]"), Frame::Noise);
        assert_eq!(parse_frame("null"), Frame::Noise);
    }

    #[test]
    fn test_parse_frame_error_envelope() {
        let frame = parse_frame(r#"{"code": -1, "msg": "x"}"#);
        assert_eq!(
            frame,
            Frame::ExchangeError {
                code: "-1".to_string(),
                msg: "x".to_string()
            }
        );
        assert!(document_from_frame(r#"{"code": -1, "msg": "x"}"#).is_none());
    }

    #[test]
    fn test_value_text_coercion() {
        assert_eq!(value_text(&json!("0.0010")), Some("0.0010".to_string()));
        assert_eq!(value_text(&json!(42)), Some("42".to_string()));
        assert_eq!(value_text(&json!(true)), Some("true".to_string()));
        assert_eq!(value_text(&json!(false)), Some("false".to_string()));
        assert_eq!(value_text(&json!(null)), None);
        assert_eq!(value_text(&json!([1])), None);
    }

    #[test]
    fn test_numbers_keep_fraction() {
        let doc: Value = serde_json::from_str(r#"{"p": 27123.45}"#).unwrap();
        let record = extract_flat(&doc, &JsonKeys::new().scalar("p"));
        assert_eq!(record["p"], "27123.45");
    }

    #[test]
    fn test_extract_flat_intersection() {
        let doc = json!({"e": "24hrMiniTicker", "E": 1000, "s": "BTCUSDT", "c": "50000", "x": 1});
        let schema = JsonKeys::new().scalars(&["E", "s", "c", "missing"]);
        let record = extract_flat(&doc, &schema);

        assert_eq!(record.len(), 3);
        assert_eq!(record["E"], "1000");
        assert_eq!(record["s"], "BTCUSDT");
        assert_eq!(record["c"], "50000");
        assert!(!record.contains_key("x"));
    }

    #[test]
    fn test_extract_flat_skips_unsupported() {
        let doc = json!({"a": null, "b": {"c": 1}, "d": "ok"});
        let record = extract_flat(&doc, &JsonKeys::new().scalars(&["a", "b", "d"]));
        assert_eq!(record.len(), 1);
        assert_eq!(record["d"], "ok");
    }

    #[test]
    fn test_extract_multi_array_groups_by_key() {
        let doc = json!([
            {"s": "BTCUSDT", "c": "50000"},
            {"s": "ETHUSDT", "c": "4000"}
        ]);
        let schema = JsonKeys::new().nested("s", &["c"]);
        let record = extract_multi(&doc, &schema, Some("s"));

        assert_eq!(record.len(), 2);
        assert_eq!(record["BTCUSDT"].len(), 1);
        assert_eq!(record["BTCUSDT"]["c"], "50000");
        assert_eq!(record["ETHUSDT"]["c"], "4000");
    }

    #[test]
    fn test_extract_multi_array_inner_follows_nested_set() {
        let doc = json!([{"s": "BTCUSDT", "c": "50000", "o": "49000"}]);
        let schema = JsonKeys::new().nested("s", &["s", "c"]);
        let record = extract_multi(&doc, &schema, Some("s"));

        let inner = &record["BTCUSDT"];
        assert_eq!(inner.len(), 2);
        assert_eq!(inner["s"], "BTCUSDT");
        assert_eq!(inner["c"], "50000");
    }

    #[test]
    fn test_extract_multi_array_skips_elements_without_key() {
        let doc = json!([{"c": "1"}, {"s": "BNBUSDT", "c": "300"}]);
        let schema = JsonKeys::new().nested("s", &["c"]);
        let record = extract_multi(&doc, &schema, Some("s"));
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["BNBUSDT"]);
    }

    #[test]
    fn test_extract_multi_array_without_array_key() {
        let doc = json!([{"s": "BTCUSDT"}]);
        let schema = JsonKeys::new().nested("s", &["s"]);
        assert!(extract_multi(&doc, &schema, None).is_empty());
    }

    #[test]
    fn test_extract_multi_object() {
        let doc = json!({
            "e": "kline",
            "E": 123,
            "s": "BTCUSDT",
            "k": {"t": 1, "o": "100.5", "c": "101.0", "x": false, "i": "1m"}
        });
        let schema = JsonKeys::new()
            .scalars(&["E", "s"])
            .nested("k", &["o", "c", "x"]);
        let record = extract_multi(&doc, &schema, None);

        assert_eq!(record["E"]["E"], "123");
        assert_eq!(record["s"]["s"], "BTCUSDT");
        assert_eq!(record["k"].len(), 3);
        assert_eq!(record["k"]["o"], "100.5");
        assert_eq!(record["k"]["x"], "false");
    }

    #[test]
    fn test_extract_multi_object_nested_requires_object() {
        let doc = json!({"k": "not-an-object"});
        let schema = JsonKeys::new().nested("k", &["o"]);
        assert!(extract_multi(&doc, &schema, None).is_empty());
    }
}
