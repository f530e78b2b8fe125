use crate::services::context::{FlowContext, Scope};
use serde_json::Value;

/// Parsed form of an API-key value: either the secret itself or a
/// `{{flow.<key>}}` / `{{global.<key>}}` pointer into a variable scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef {
    Literal(String),
    Scoped { scope: Scope, key: String },
}

impl SecretRef {
    pub fn parse(raw: &str) -> Self {
        let scoped = raw
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
            .and_then(|inner| inner.split_once('.'))
            .and_then(|(scope, key)| {
                let scope = Scope::parse(scope)?;
                (!key.is_empty()).then(|| SecretRef::Scoped {
                    scope,
                    key: key.to_string(),
                })
            });
        scoped.unwrap_or_else(|| SecretRef::Literal(raw.to_string()))
    }

    pub fn resolve(&self, context: &FlowContext) -> Option<Value> {
        match self {
            SecretRef::Literal(text) => Some(Value::String(text.clone())),
            SecretRef::Scoped { scope, key } => context.get(*scope, key),
        }
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self, SecretRef::Scoped { .. })
    }
}

pub fn resolve_secret(raw: &str, context: &FlowContext) -> Option<Value> {
    SecretRef::parse(raw).resolve(context)
}
