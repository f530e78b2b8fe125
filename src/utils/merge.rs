use serde_json::{Map, Value};

/// Shallow merge; keys in `source` overwrite keys in `target`.
pub fn merge_into(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        target.insert(key.clone(), value.clone());
    }
}

/// Header names are case-insensitive, so an incoming name replaces every
/// existing spelling of it.
pub fn set_header(target: &mut Map<String, Value>, name: &str, value: Value) {
    target.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    target.insert(name.to_string(), value);
}

pub fn merge_headers_into(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        set_header(target, key, value.clone());
    }
}

pub fn as_object(value: Option<&Value>) -> Option<&Map<String, Value>> {
    match value {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}
