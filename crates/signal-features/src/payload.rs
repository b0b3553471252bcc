//! Payload Field Access
//!
//! Decoded events are loose JSON objects; these helpers pull sample
//! arrays, sample rates and identifiers out of them without panicking on
//! shape surprises.

use serde_json::{Map, Value};

/// Canonical axis names with the payload keys accepted for each.
pub const AXES: [(&str, [&str; 2]); 3] = [
    ("ax", ["ax", "x"]),
    ("ay", ["ay", "y"]),
    ("az", ["az", "z"]),
];

/// Object keys probed for nested axis containers, in order.
const AXIS_PARENTS: [&str; 4] = ["axes", "acc", "accel", "acceleration"];

/// Identifier keys, in resolution order.
const DEVICE_ID_KEYS: [&str; 3] = ["device_id", "sensor_id", "id"];

/// Samples carried by one value: a numeric array, or a scalar promoted to
/// a single-sample window. Non-numeric array entries are skipped.
fn samples_from(value: &Value) -> Option<Vec<f64>> {
    match value {
        Value::Array(items) => Some(items.iter().filter_map(Value::as_f64).collect()),
        Value::Number(_) => value.as_f64().map(|v| vec![v]),
        _ => None,
    }
}

/// Find the sample window for one axis.
///
/// Tries the direct keys first, then the same keys nested under any of
/// the known container objects. `None` means the axis is absent.
pub fn axis_samples(payload: &Map<String, Value>, names: &[&str]) -> Option<Vec<f64>> {
    for name in names {
        if let Some(samples) = payload.get(*name).and_then(samples_from) {
            return Some(samples);
        }
    }

    for parent in AXIS_PARENTS {
        if let Some(Value::Object(nested)) = payload.get(parent) {
            for name in names {
                if let Some(samples) = nested.get(*name).and_then(samples_from) {
                    return Some(samples);
                }
            }
        }
    }

    None
}

/// Event-declared sample rate (`fs`), when present and numeric.
pub fn sample_rate(payload: &Map<String, Value>) -> Option<f64> {
    payload.get("fs").and_then(Value::as_f64)
}

/// Device identifier carried by the payload, if any.
///
/// `device_id`, then `sensor_id`, then `id`; string and number values are
/// accepted.
pub fn device_id(payload: &Map<String, Value>) -> Option<String> {
    for key in DEVICE_ID_KEYS {
        match payload.get(key) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_direct_axis_key_wins_over_nested() {
        let payload = object(json!({
            "ax": [1.0, 2.0],
            "axes": { "ax": [9.0] }
        }));
        assert_eq!(axis_samples(&payload, &["ax", "x"]), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn test_nested_axis_under_any_known_parent() {
        for parent in ["axes", "acc", "accel", "acceleration"] {
            let payload = object(json!({ parent: { "z": [0.5] } }));
            assert_eq!(axis_samples(&payload, &["az", "z"]), Some(vec![0.5]));
        }
    }

    #[test]
    fn test_scalar_promoted_to_single_sample() {
        let payload = object(json!({ "y": 3.5 }));
        assert_eq!(axis_samples(&payload, &["ay", "y"]), Some(vec![3.5]));
    }

    #[test]
    fn test_unusable_values_mean_absent_axis() {
        let payload = object(json!({ "ax": "not samples" }));
        assert_eq!(axis_samples(&payload, &["ax", "x"]), None);
        assert_eq!(axis_samples(&object(json!({})), &["ax", "x"]), None);
    }

    #[test]
    fn test_non_numeric_array_entries_skipped() {
        let payload = object(json!({ "x": [1.0, "bad", 2.0, null] }));
        assert_eq!(axis_samples(&payload, &["ax", "x"]), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn test_device_id_resolution_order() {
        let payload = object(json!({
            "id": "c",
            "sensor_id": "b",
            "device_id": "a"
        }));
        assert_eq!(device_id(&payload), Some("a".to_string()));

        let payload = object(json!({ "id": 7, "sensor_id": "b" }));
        assert_eq!(device_id(&payload), Some("b".to_string()));

        let payload = object(json!({ "id": 7 }));
        assert_eq!(device_id(&payload), Some("7".to_string()));

        assert_eq!(device_id(&object(json!({}))), None);
    }

    #[test]
    fn test_sample_rate_requires_number() {
        assert_eq!(sample_rate(&object(json!({ "fs": 3200 }))), Some(3200.0));
        assert_eq!(sample_rate(&object(json!({ "fs": "fast" }))), None);
        assert_eq!(sample_rate(&object(json!({}))), None);
    }
}
