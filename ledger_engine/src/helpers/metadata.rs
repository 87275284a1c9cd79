use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Shallow-merges `patch` into `base`. Keys in `patch` win; every other key in `base` is preserved.
///
/// A `base` that is not a JSON object is discarded, since there is nothing meaningful to merge into.
pub fn merge_metadata(base: &Value, patch: &Value) -> Value {
    let mut merged = match base {
        Value::Object(m) => m.clone(),
        _ => Map::new(),
    };
    if let Value::Object(p) = patch {
        for (k, v) in p {
            merged.insert(k.clone(), v.clone());
        }
    }
    Value::Object(merged)
}

/// Copies the listed keys from `source` into a new object, skipping any that are absent or null.
pub fn pick_keys(source: &Value, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|&k| source.get(k).filter(|v| !v.is_null()).map(|v| (k.to_string(), v.clone())))
        .collect()
}

pub fn timestamp(now: DateTime<Utc>) -> Value {
    Value::String(now.to_rfc3339())
}
