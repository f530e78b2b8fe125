use crate::errors::QurlError;
use serde_json::{Map, Value};
use url::Url;

const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// `scheme://` or protocol-relative `//host` URLs are absolute.
pub fn is_absolute_url(raw: &str) -> bool {
    if raw.starts_with("//") {
        return true;
    }
    let Some((scheme, rest)) = raw.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let valid_scheme = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid_scheme && rest.starts_with("//")
}

/// Joins base and path with exactly one slash between them. Not an RFC 3986
/// reference resolution: the base path is always kept.
pub fn combine_urls(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        return base.to_string();
    }
    let base = base.strip_suffix('/').unwrap_or(base);
    let base = base.strip_suffix('/').unwrap_or(base);
    format!("{}/{}", base, relative.trim_start_matches('/'))
}

pub fn full_path(base: &str, url: &str) -> String {
    if !base.is_empty() && !is_absolute_url(url) {
        combine_urls(base, url)
    } else {
        url.to_string()
    }
}

fn render_param(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

pub fn append_params(url: &mut Url, params: &Map<String, Value>) {
    let rendered: Vec<(&str, String)> = params
        .iter()
        .flat_map(|(key, value)| {
            let items: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            items
                .into_iter()
                .filter_map(move |item| render_param(item).map(|text| (key.as_str(), text)))
        })
        .collect();
    if rendered.is_empty() {
        return;
    }
    let mut pairs = url.query_pairs_mut();
    for (key, value) in &rendered {
        pairs.append_pair(key, value);
    }
}

pub fn parse_http_url(raw: &str) -> Result<Url, QurlError> {
    let parsed = Url::parse(raw).map_err(|err| {
        QurlError::invalid_params(format!("Invalid URL '{}': {}", raw, err))
            .with_hint("Set the endpoint baseURL or pass an absolute url.")
    })?;
    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(QurlError::invalid_params(format!(
            "Unsupported URL scheme '{}': only http and https are allowed",
            parsed.scheme()
        )));
    }
    Ok(parsed)
}

pub fn build_request_url(
    base: &str,
    url: &str,
    params: &Map<String, Value>,
) -> Result<Url, QurlError> {
    let mut parsed = parse_http_url(&full_path(base, url))?;
    append_params(&mut parsed, params);
    Ok(parsed)
}

pub fn same_origin(left: &Url, right: &Url) -> bool {
    left.scheme() == right.scheme()
        && left.host_str() == right.host_str()
        && left.port_or_known_default() == right.port_or_known_default()
}
