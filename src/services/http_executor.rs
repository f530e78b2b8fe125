use crate::constants::{http as http_constants, network};
use crate::errors::QurlError;
use crate::services::logger::Logger;
use crate::services::request_config::{RequestDescriptor, ResponseType};
use crate::utils::request_url::{build_request_url, same_origin};
use base64::Engine;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE,
    COOKIE, LOCATION, PROXY_AUTHORIZATION, USER_AGENT,
};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectHop {
    pub url: String,
    pub status_code: u16,
    pub headers: Map<String, Value>,
}

impl RedirectHop {
    pub fn into_value(self) -> Value {
        serde_json::json!({
            "url": self.url,
            "statusCode": self.status_code,
            "headers": self.headers,
        })
    }
}

/// Normalized response. Rejected statuses travel in the downgraded form
/// without `responseUrl` and `redirectList`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub payload: Value,
    pub headers: Map<String, Value>,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_list: Option<Vec<RedirectHop>>,
}

impl ResultEnvelope {
    pub fn downgraded(mut self) -> Self {
        self.response_url = None;
        self.redirect_list = None;
        self
    }

    pub fn is_downgraded(&self) -> bool {
        self.response_url.is_none() && self.redirect_list.is_none()
    }
}

#[derive(Debug)]
pub enum SendError {
    /// A response arrived but status validation rejected it.
    Rejected(ResultEnvelope),
    /// No response could be obtained.
    Failed(QurlError),
}

impl SendError {
    pub fn into_error(self) -> QurlError {
        match self {
            SendError::Rejected(envelope) => QurlError::http_status(envelope.status_code),
            SendError::Failed(err) => err,
        }
    }
}

impl From<QurlError> for SendError {
    fn from(err: QurlError) -> Self {
        SendError::Failed(err)
    }
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Rejected(envelope) => {
                write!(f, "Request failed with status code {}", envelope.status_code)
            }
            SendError::Failed(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SendError {}

#[derive(Debug, Clone)]
pub struct HttpExecutor {
    logger: Logger,
}

impl HttpExecutor {
    pub fn new(logger: &Logger) -> Self {
        Self {
            logger: logger.child("executor"),
        }
    }

    /// Sends the descriptor, telling rejected statuses apart from failures.
    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<ResultEnvelope, SendError> {
        let started = Instant::now();
        let mut current = build_request_url(&descriptor.base_url, &descriptor.url, &descriptor.params)?;
        let mut method = descriptor.method.clone();
        let mut headers = headers_to_headermap(&descriptor.headers)?;
        let (mut body, content_type) = prepare_body(descriptor.data.as_ref())?;
        apply_default_headers(&mut headers, content_type);

        let mut basic_auth = descriptor.basic_auth.clone();
        if basic_auth.is_some() {
            headers.remove(AUTHORIZATION);
        }

        let client = descriptor.agents.client_for(descriptor.proxy.as_ref())?;
        let timeout_ms = if descriptor.timeout_ms == 0 {
            network::TIMEOUT_REQUEST_MS
        } else {
            descriptor.timeout_ms
        };
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut hops: Vec<RedirectHop> = Vec::new();

        let response = loop {
            let mut request = client
                .request(method.clone(), current.clone())
                .headers(headers.clone());
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timeout_error(timeout_ms).into());
            }
            request = request.timeout(remaining);
            if let Some(bytes) = &body {
                request = request.body(bytes.clone());
            }
            if let Some(credentials) = &basic_auth {
                request = request.basic_auth(&credentials.username, Some(&credentials.password));
            }

            let response = request
                .send()
                .await
                .map_err(|err| map_send_error(err, timeout_ms))?;
            let Some(next) = redirect_target(&current, &response)? else {
                break response;
            };

            let status = response.status();
            hops.push(RedirectHop {
                url: current.to_string(),
                status_code: status.as_u16(),
                headers: headers_to_value(response.headers()),
            });
            if hops.len() > network::MAX_REDIRECTS {
                return Err(QurlError::transport("Maximum number of redirects exceeded")
                    .with_details(serde_json::json!({ "max_redirects": network::MAX_REDIRECTS }))
                    .into());
            }
            self.logger.debug(
                "following redirect",
                Some(&serde_json::json!({
                    "status": status.as_u16(),
                    "from": origin_and_path(&current),
                    "to": origin_and_path(&next),
                })),
            );

            if let Some(switched) = redirected_method(status, &method) {
                method = switched;
                body = None;
                headers.remove(CONTENT_TYPE);
                headers.remove(CONTENT_LENGTH);
            }
            if !same_origin(&current, &next) {
                headers.remove(AUTHORIZATION);
                headers.remove(PROXY_AUTHORIZATION);
                headers.remove(COOKIE);
                basic_auth = None;
            }
            current = next;
        };

        let status = response.status().as_u16();
        let response_headers = headers_to_value(response.headers());
        let response_url = response.url().to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| map_send_error(err, timeout_ms))?;

        let envelope = ResultEnvelope {
            payload: decode_payload(&bytes, descriptor.response_type),
            headers: response_headers,
            status_code: status,
            response_url: Some(response_url),
            redirect_list: Some(hops),
        };
        let accepted = !descriptor.validate_status || (200..300).contains(&status);
        self.logger.debug(
            "response received",
            Some(&serde_json::json!({
                "method": method.as_str(),
                "url": origin_and_path(&current),
                "status": status,
                "accepted": accepted,
                "redirects": envelope.redirect_list.as_ref().map_or(0, Vec::len),
                "elapsed_ms": started.elapsed().as_millis() as u64,
            })),
        );

        if accepted {
            Ok(envelope)
        } else {
            Err(SendError::Rejected(envelope.downgraded()))
        }
    }

    /// Rejected statuses resolve to their downgraded envelope; only
    /// failures without a response are errors.
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<ResultEnvelope, QurlError> {
        match self.send(descriptor).await {
            Ok(envelope) | Err(SendError::Rejected(envelope)) => Ok(envelope),
            Err(SendError::Failed(err)) => Err(err),
        }
    }
}

fn timeout_error(timeout_ms: u64) -> QurlError {
    QurlError::timeout(format!("timeout of {}ms exceeded", timeout_ms))
        .with_details(serde_json::json!({ "timeout_ms": timeout_ms }))
}

fn map_send_error(err: reqwest::Error, timeout_ms: u64) -> QurlError {
    if err.is_timeout() {
        return timeout_error(timeout_ms);
    }
    QurlError::from(err)
}

fn origin_and_path(url: &Url) -> String {
    format!("{}{}", url.origin().ascii_serialization(), url.path())
}

fn header_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn headers_to_headermap(headers: &Map<String, Value>) -> Result<HeaderMap, QurlError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| QurlError::invalid_params(format!("Invalid header name: {}", key)))?;
        let values: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for item in values {
            let Some(text) = header_text(item) else {
                continue;
            };
            let parsed = HeaderValue::from_str(&text).map_err(|_| {
                QurlError::invalid_params(format!("Invalid value for header {}", key))
            })?;
            map.append(name.clone(), parsed);
        }
    }
    Ok(map)
}

fn apply_default_headers(headers: &mut HeaderMap, content_type: Option<&'static str>) {
    if !headers.contains_key(ACCEPT) {
        headers.insert(ACCEPT, HeaderValue::from_static(http_constants::ACCEPT));
    }
    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(http_constants::USER_AGENT));
    }
    if let Some(content_type) = content_type {
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }
}

/// Response headers with lowercase names; repeated headers become arrays.
fn headers_to_value(headers: &HeaderMap) -> Map<String, Value> {
    let mut map = Map::new();
    for name in headers.keys() {
        let values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|value| Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        let entry = match <[Value; 1]>::try_from(values) {
            Ok([single]) => single,
            Err(values) => Value::Array(values),
        };
        map.insert(name.as_str().to_string(), entry);
    }
    map
}

/// Objects and arrays go out as JSON, strings as plain text, other scalars
/// in their JSON form.
fn prepare_body(data: Option<&Value>) -> Result<(Option<Vec<u8>>, Option<&'static str>), QurlError> {
    match data {
        None | Some(Value::Null) => Ok((None, None)),
        Some(Value::String(text)) => Ok((
            Some(text.clone().into_bytes()),
            Some("text/plain;charset=utf-8"),
        )),
        Some(body) => {
            let text = serde_json::to_vec(body)
                .map_err(|_| QurlError::invalid_params("data must be JSON-serializable"))?;
            Ok((Some(text), Some("application/json")))
        }
    }
}

fn decode_payload(bytes: &[u8], response_type: ResponseType) -> Value {
    match response_type {
        ResponseType::Arraybuffer => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        ResponseType::Text => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ResponseType::Json => serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}

fn redirect_target(current: &Url, response: &reqwest::Response) -> Result<Option<Url>, QurlError> {
    if !matches!(response.status().as_u16(), 301 | 302 | 303 | 307 | 308) {
        return Ok(None);
    }
    let Some(location) = response.headers().get(LOCATION) else {
        return Ok(None);
    };
    let location = location
        .to_str()
        .map_err(|_| QurlError::transport("Redirect location is not valid text"))?;
    let next = current
        .join(location)
        .map_err(|err| QurlError::transport(format!("Invalid redirect location '{}': {}", location, err)))?;
    if !matches!(next.scheme(), "http" | "https") {
        return Err(QurlError::transport(format!(
            "Unsupported redirect protocol: {}",
            next.scheme()
        )));
    }
    Ok(Some(next))
}

/// Method for the next hop when it changes; `None` keeps method and body.
fn redirected_method(status: StatusCode, method: &Method) -> Option<Method> {
    match status.as_u16() {
        301 | 302 if *method == Method::POST => Some(Method::GET),
        303 if *method != Method::GET && *method != Method::HEAD => Some(Method::GET),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prepare_body_by_shape() {
        assert_eq!(prepare_body(None).unwrap(), (None, None));
        assert_eq!(prepare_body(Some(&Value::Null)).unwrap(), (None, None));

        let (body, content_type) = prepare_body(Some(&json!({"a": 1}))).unwrap();
        assert_eq!(body.unwrap(), br#"{"a":1}"#.to_vec());
        assert_eq!(content_type, Some("application/json"));

        let (body, content_type) = prepare_body(Some(&json!("raw text"))).unwrap();
        assert_eq!(body.unwrap(), b"raw text".to_vec());
        assert_eq!(content_type, Some("text/plain;charset=utf-8"));
    }

    #[test]
    fn decode_payload_follows_response_type() {
        assert_eq!(decode_payload(br#"{"ok":true}"#, ResponseType::Json), json!({"ok": true}));
        assert_eq!(decode_payload(b"not json", ResponseType::Json), json!("not json"));
        assert_eq!(decode_payload(b"", ResponseType::Json), json!(""));
        assert_eq!(decode_payload(br#"{"ok":true}"#, ResponseType::Text), json!(r#"{"ok":true}"#));
        assert_eq!(decode_payload(b"hi", ResponseType::Arraybuffer), json!("aGk="));
    }

    #[test]
    fn repeated_response_headers_become_arrays() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let value = headers_to_value(&headers);
        assert_eq!(
            Value::Object(value),
            json!({"set-cookie": ["a=1", "b=2"], "content-type": "application/json"})
        );
    }

    #[test]
    fn request_headers_accept_scalars_and_arrays() {
        let headers = json!({"X-Num": 5, "X-Multi": ["a", "b"], "X-Skip": null});
        let map = headers_to_headermap(headers.as_object().unwrap()).unwrap();
        assert_eq!(map.get("x-num").unwrap(), "5");
        assert_eq!(map.get_all("x-multi").iter().count(), 2);
        assert!(map.get("x-skip").is_none());

        let bad = json!({"bad header": "x"});
        assert!(headers_to_headermap(bad.as_object().unwrap()).is_err());
    }

    #[test]
    fn defaults_do_not_override_caller_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/csv"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        apply_default_headers(&mut headers, Some("application/json"));
        assert_eq!(headers.get(ACCEPT).unwrap(), "text/csv");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/xml");
        assert!(headers.get(USER_AGENT).unwrap().to_str().unwrap().starts_with("qurl/"));
    }

    #[test]
    fn redirect_method_rules() {
        let found = StatusCode::FOUND;
        assert_eq!(redirected_method(found, &Method::POST), Some(Method::GET));
        assert_eq!(redirected_method(found, &Method::PUT), None);
        assert_eq!(redirected_method(StatusCode::SEE_OTHER, &Method::PUT), Some(Method::GET));
        assert_eq!(redirected_method(StatusCode::SEE_OTHER, &Method::HEAD), None);
        assert_eq!(redirected_method(StatusCode::TEMPORARY_REDIRECT, &Method::POST), None);
        assert_eq!(redirected_method(StatusCode::PERMANENT_REDIRECT, &Method::POST), None);
    }

    #[test]
    fn rejected_send_error_maps_to_http_status() {
        let envelope = ResultEnvelope {
            payload: json!("nope"),
            headers: Map::new(),
            status_code: 404,
            response_url: None,
            redirect_list: None,
        };
        assert!(envelope.is_downgraded());
        let err = SendError::Rejected(envelope).into_error();
        assert_eq!(err.message, "Request failed with status code 404");
        assert!(!err.is_transport_failure());
    }
}
