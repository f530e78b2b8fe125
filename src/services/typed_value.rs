use crate::errors::QurlError;
use crate::services::context::{FlowContext, Scope};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where the reference of a typed value points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    #[serde(rename = "str", alias = "literal")]
    Literal,
    #[serde(rename = "msg", alias = "message")]
    Message,
    #[serde(rename = "flow")]
    Flow,
    #[serde(rename = "global")]
    Global,
    #[serde(other)]
    Unknown,
}

pub fn resolve_typed(
    kind: ValueKind,
    reference: &str,
    message: &Map<String, Value>,
    context: &FlowContext,
) -> Option<Value> {
    match kind {
        ValueKind::Literal => Some(Value::String(reference.to_string())),
        ValueKind::Message => message.get(reference).cloned(),
        ValueKind::Flow => context.get(Scope::Flow, reference),
        ValueKind::Global => context.get(Scope::Global, reference),
        ValueKind::Unknown => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(rename = "keyType")]
    pub key_type: ValueKind,
    #[serde(rename = "keyValue", alias = "keyRef", default)]
    pub key_ref: String,
    #[serde(rename = "valueType")]
    pub value_type: ValueKind,
    #[serde(rename = "valueValue", alias = "valueRef", default)]
    pub value_ref: String,
}

impl FieldMapping {
    pub fn literal(key: &str, value: &str) -> Self {
        Self {
            key_type: ValueKind::Literal,
            key_ref: key.to_string(),
            value_type: ValueKind::Literal,
            value_ref: value.to_string(),
        }
    }
}

/// Parses a raw mapping list. Anything but an array is a configuration
/// error; entries that fail to parse are skipped and reported alongside.
pub fn parse_mappings(raw: &Value, label: &str) -> (Vec<FieldMapping>, Vec<QurlError>) {
    let entries = match raw {
        Value::Null => return (Vec::new(), Vec::new()),
        Value::Array(entries) => entries,
        _ => {
            return (
                Vec::new(),
                vec![QurlError::config(format!("{} must be a list of field mappings", label))],
            )
        }
    };
    let mut mappings = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        match serde_json::from_value::<FieldMapping>(entry.clone()) {
            Ok(mapping) => mappings.push(mapping),
            Err(err) => errors.push(
                QurlError::config(format!("{}[{}] is not a valid field mapping: {}", label, index, err))
                    .with_details(entry.clone()),
            ),
        }
    }
    (mappings, errors)
}

fn key_to_string(key: Value) -> Option<String> {
    match key {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Folds mappings into one object in order; duplicate keys keep the last
/// value. Entries whose key or value does not resolve are left out.
pub fn resolve_mappings(
    mappings: &[FieldMapping],
    message: &Map<String, Value>,
    context: &FlowContext,
) -> Map<String, Value> {
    let mut out = Map::new();
    for mapping in mappings {
        let Some(key) = resolve_typed(mapping.key_type, &mapping.key_ref, message, context)
            .and_then(key_to_string)
        else {
            continue;
        };
        if let Some(value) = resolve_typed(mapping.value_type, &mapping.value_ref, message, context) {
            out.insert(key, value);
        }
    }
    out
}
