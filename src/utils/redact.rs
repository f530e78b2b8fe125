use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::collections::HashSet;

const REDACTION: &str = "[REDACTED]";

static SENSITIVE_HEADER_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "authorization",
        "proxy-authorization",
        "cookie",
        "set-cookie",
        "x-api-key",
        "x-auth-token",
        "x-access-token",
    ]
    .into_iter()
    .collect()
});

static SENSITIVE_PARAM_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "api_key",
        "apikey",
        "access_token",
        "token",
        "secret",
        "password",
        "client_secret",
    ]
    .into_iter()
    .collect()
});

pub fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADER_KEYS.contains(name.to_ascii_lowercase().as_str())
}

pub fn is_sensitive_param(name: &str) -> bool {
    SENSITIVE_PARAM_KEYS.contains(name.to_ascii_lowercase().as_str())
}

/// Copies `map`, masking well-known secret keys plus any name in `extra`
/// (compared case-insensitively).
pub fn redact_map(map: &Map<String, Value>, extra: &[&str], is_sensitive: fn(&str) -> bool) -> Value {
    let out = map
        .iter()
        .map(|(key, value)| {
            let masked = is_sensitive(key)
                || extra.iter().any(|name| name.eq_ignore_ascii_case(key));
            if masked && !value.is_null() {
                (key.clone(), Value::String(REDACTION.to_string()))
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect();
    Value::Object(out)
}

pub fn redact_headers(headers: &Map<String, Value>, extra: &[&str]) -> Value {
    redact_map(headers, extra, is_sensitive_header)
}

pub fn redact_params(params: &Map<String, Value>, extra: &[&str]) -> Value {
    redact_map(params, extra, is_sensitive_param)
}
