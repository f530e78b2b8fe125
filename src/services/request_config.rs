use crate::constants::{http as http_constants, message as fields, network};
use crate::errors::QurlError;
use crate::services::agents::AgentPool;
use crate::services::context::FlowContext;
use crate::services::logger::Logger;
use crate::services::profile::{ApiKeyLocation, Credentials, EndpointProfile, ProxySettings};
use crate::services::secret_ref::SecretRef;
use crate::services::typed_value::{resolve_mappings, FieldMapping};
use crate::utils::merge::{as_object, merge_headers_into, merge_into, set_header};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Unit-level method setting. `CallerChoice` is the `"use"` config value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodPolicy {
    Fixed(Method),
    CallerChoice,
}

impl Default for MethodPolicy {
    fn default() -> Self {
        MethodPolicy::Fixed(Method::GET)
    }
}

impl MethodPolicy {
    pub fn parse(raw: &str) -> Result<Self, QurlError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(MethodPolicy::default());
        }
        if trimmed.eq_ignore_ascii_case(http_constants::METHOD_CALLER_CHOICE) {
            return Ok(MethodPolicy::CallerChoice);
        }
        parse_method(trimmed).map(MethodPolicy::Fixed)
    }

    /// An explicit caller method wins; the sentinel counts as "not given".
    pub fn resolve(&self, requested: Option<&str>) -> Result<Method, QurlError> {
        let requested = requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .filter(|m| !m.eq_ignore_ascii_case(http_constants::METHOD_CALLER_CHOICE));
        match (requested, self) {
            (Some(method), _) => parse_method(method),
            (None, MethodPolicy::Fixed(method)) => Ok(method.clone()),
            (None, MethodPolicy::CallerChoice) => parse_method(http_constants::DEFAULT_METHOD),
        }
    }
}

impl<'de> Deserialize<'de> for MethodPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        MethodPolicy::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn parse_method(raw: &str) -> Result<Method, QurlError> {
    Method::from_bytes(raw.to_uppercase().as_bytes())
        .map_err(|_| QurlError::invalid_params(format!("Invalid HTTP method: {}", raw)))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Json,
    Text,
    #[serde(alias = "bytes", alias = "buffer")]
    Arraybuffer,
}

/// Request settings fixed at unit configuration time.
#[derive(Debug, Clone)]
pub struct UnitDefaults {
    pub method: MethodPolicy,
    pub url: Option<String>,
    pub timeout_ms: u64,
    pub response_type: ResponseType,
    pub validate_status: bool,
    pub headers: Vec<FieldMapping>,
    pub params: Vec<FieldMapping>,
}

impl Default for UnitDefaults {
    fn default() -> Self {
        Self {
            method: MethodPolicy::default(),
            url: None,
            timeout_ms: network::TIMEOUT_REQUEST_MS,
            response_type: ResponseType::default(),
            validate_status: true,
            headers: Vec::new(),
            params: Vec::new(),
        }
    }
}

/// Per-call request fields, taken from a trigger event or passed to a bound
/// callable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn present(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

impl Overrides {
    /// Reads the request fields of a trigger event. Fields of the wrong shape
    /// are ignored rather than rejected.
    pub fn from_message(message: &Map<String, Value>) -> Self {
        Self {
            method: non_empty_str(message.get(fields::METHOD)),
            url: non_empty_str(message.get(fields::URL)),
            params: as_object(message.get(fields::PARAMS)).cloned().unwrap_or_default(),
            headers: as_object(message.get(fields::HEADERS)).cloned().unwrap_or_default(),
            data: present(message.get(fields::DATA)),
            payload: present(message.get(fields::PAYLOAD)),
        }
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    pub fn url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn header(mut self, key: &str, value: Value) -> Self {
        self.headers.insert(key.to_string(), value);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Fully merged request, handed to the executor as-is.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub base_url: String,
    pub url: String,
    pub params: Map<String, Value>,
    pub headers: Map<String, Value>,
    pub data: Option<Value>,
    pub timeout_ms: u64,
    pub response_type: ResponseType,
    pub validate_status: bool,
    pub basic_auth: Option<Credentials>,
    pub proxy: Option<ProxySettings>,
    pub agents: Arc<AgentPool>,
}

impl RequestDescriptor {
    /// Header and param names whose values must never be logged.
    pub fn secret_names(&self, profile: Option<&EndpointProfile>) -> Vec<String> {
        profile
            .and_then(|p| p.api_key.as_ref())
            .map(|key| vec![key.name.clone()])
            .unwrap_or_default()
    }
}

/// Which invocation path a descriptor is built for.
#[derive(Debug, Clone, Copy)]
pub enum BuildMode<'a> {
    /// Trigger-driven: field mappings resolve against the event, and an
    /// object payload doubles as GET query parameters.
    Eager { message: &'a Map<String, Value> },
    /// Bound callable: only the per-call overrides are merged.
    Deferred,
}

pub struct RequestConfigBuilder<'a> {
    profile: Option<&'a EndpointProfile>,
    defaults: &'a UnitDefaults,
    context: &'a FlowContext,
    agents: &'a Arc<AgentPool>,
    logger: Option<&'a Logger>,
}

impl<'a> RequestConfigBuilder<'a> {
    pub fn new(
        profile: Option<&'a EndpointProfile>,
        defaults: &'a UnitDefaults,
        context: &'a FlowContext,
        agents: &'a Arc<AgentPool>,
    ) -> Self {
        Self {
            profile,
            defaults,
            context,
            agents,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: &'a Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(
        &self,
        overrides: &Overrides,
        mode: BuildMode<'_>,
    ) -> Result<RequestDescriptor, QurlError> {
        let method = self.defaults.method.resolve(overrides.method.as_deref())?;
        let url = overrides
            .url
            .clone()
            .or_else(|| self.defaults.url.clone())
            .unwrap_or_default();

        let (mut params, mut headers) = match mode {
            BuildMode::Eager { message } => (
                resolve_mappings(&self.defaults.params, message, self.context),
                resolve_mappings(&self.defaults.headers, message, self.context),
            ),
            BuildMode::Deferred => (Map::new(), Map::new()),
        };
        merge_into(&mut params, &overrides.params);
        merge_headers_into(&mut headers, &overrides.headers);

        let mut data = None;
        if method == Method::GET {
            if let (BuildMode::Eager { .. }, Some(Value::Object(payload))) =
                (mode, overrides.payload.as_ref())
            {
                merge_into(&mut params, payload);
            }
        } else {
            data = overrides.data.clone().or_else(|| overrides.payload.clone());
        }

        if let Some(token) = self.profile.and_then(|p| p.bearer_token.as_deref()) {
            set_header(&mut headers, "Authorization", Value::String(format!("Bearer {}", token)));
        }

        let mut descriptor = RequestDescriptor {
            method,
            base_url: self.profile.map(|p| p.base_url.clone()).unwrap_or_default(),
            url,
            params,
            headers,
            data,
            timeout_ms: self.defaults.timeout_ms,
            response_type: self.defaults.response_type,
            validate_status: self.defaults.validate_status,
            basic_auth: self.profile.and_then(|p| p.basic_auth.clone()),
            proxy: self.profile.and_then(|p| p.proxy.clone()),
            agents: self.agents.clone(),
        };
        self.inject_api_key(&mut descriptor);
        Ok(descriptor)
    }

    /// Runs last so caller input cannot override the key. A reference that
    /// resolves to nothing leaves the request untouched.
    fn inject_api_key(&self, descriptor: &mut RequestDescriptor) {
        let Some(api_key) = self.profile.and_then(|p| p.api_key.as_ref()) else {
            return;
        };
        let reference = SecretRef::parse(&api_key.value);
        let Some(value) = reference.resolve(self.context) else {
            if let (Some(logger), SecretRef::Scoped { scope, key }) = (self.logger, &reference) {
                logger.warn(
                    "API key reference did not resolve; request sent without it",
                    Some(&serde_json::json!({ "scope": scope.as_str(), "key": key })),
                );
            }
            return;
        };
        inject_api_key(descriptor, api_key.location, &api_key.name, value);
    }
}

pub fn inject_api_key(
    descriptor: &mut RequestDescriptor,
    location: ApiKeyLocation,
    name: &str,
    value: Value,
) {
    match location {
        ApiKeyLocation::Headers => set_header(&mut descriptor.headers, name, value),
        ApiKeyLocation::Params => {
            descriptor.params.insert(name.to_string(), value);
        }
        ApiKeyLocation::Data => match descriptor.data.as_mut() {
            Some(Value::Object(body)) => {
                body.insert(name.to_string(), value);
            }
            None => {
                let mut body = Map::new();
                body.insert(name.to_string(), value);
                descriptor.data = Some(Value::Object(body));
            }
            Some(_) => {}
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::context::MemoryStore;
    use crate::services::status::NoopStatusSink;
    use serde_json::json;

    struct Fixture {
        profile: Option<EndpointProfile>,
        defaults: UnitDefaults,
        context: FlowContext,
        agents: Arc<AgentPool>,
        global: Arc<MemoryStore>,
    }

    impl Fixture {
        fn new(profile: Option<EndpointProfile>) -> Self {
            let global = Arc::new(MemoryStore::new());
            let agents = Arc::new(AgentPool::new(profile.as_ref(), true, &NoopStatusSink).unwrap());
            Self {
                profile,
                defaults: UnitDefaults::default(),
                context: FlowContext::new(Arc::new(MemoryStore::new()), global.clone()),
                agents,
                global,
            }
        }

        fn build(&self, overrides: &Overrides, mode: BuildMode<'_>) -> RequestDescriptor {
            RequestConfigBuilder::new(
                self.profile.as_ref(),
                &self.defaults,
                &self.context,
                &self.agents,
            )
            .build(overrides, mode)
            .unwrap()
        }
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn method_policy_resolution() {
        let fixed = MethodPolicy::parse("post").unwrap();
        assert_eq!(fixed, MethodPolicy::Fixed(Method::POST));
        assert_eq!(fixed.resolve(None).unwrap(), Method::POST);
        assert_eq!(fixed.resolve(Some("delete")).unwrap(), Method::DELETE);
        assert_eq!(fixed.resolve(Some("use")).unwrap(), Method::POST);

        let caller = MethodPolicy::parse("use").unwrap();
        assert_eq!(caller, MethodPolicy::CallerChoice);
        assert_eq!(caller.resolve(None).unwrap(), Method::GET);
        assert_eq!(caller.resolve(Some("Patch")).unwrap(), Method::PATCH);
        assert!(caller.resolve(Some("bad method")).is_err());
    }

    #[test]
    fn get_params_fold_mappings_then_params_then_payload() {
        let mut fixture = Fixture::new(None);
        fixture.defaults.params = vec![
            FieldMapping::literal("a", "mapping"),
            FieldMapping::literal("b", "mapping"),
            FieldMapping::literal("c", "mapping"),
        ];
        let message = obj(json!({}));
        let overrides = Overrides::default()
            .param("b", json!("params"))
            .param("c", json!("params"))
            .payload(json!({"c": "payload", "d": 4}));
        let descriptor = fixture.build(&overrides, BuildMode::Eager { message: &message });
        assert_eq!(
            Value::Object(descriptor.params),
            json!({"a": "mapping", "b": "params", "c": "payload", "d": 4})
        );
        assert!(descriptor.data.is_none());
    }

    #[test]
    fn deferred_get_ignores_mappings_and_payload() {
        let mut fixture = Fixture::new(None);
        fixture.defaults.params = vec![FieldMapping::literal("a", "mapping")];
        let overrides = Overrides::default()
            .param("b", json!(1))
            .payload(json!({"c": 2}));
        let descriptor = fixture.build(&overrides, BuildMode::Deferred);
        assert_eq!(Value::Object(descriptor.params), json!({"b": 1}));
    }

    #[test]
    fn non_get_prefers_data_over_payload() {
        let fixture = Fixture::new(None);
        let message = obj(json!({}));
        let both = Overrides::default()
            .method("post")
            .param("q", json!("x"))
            .data(json!({"from": "data"}))
            .payload(json!({"from": "payload"}));
        let descriptor = fixture.build(&both, BuildMode::Eager { message: &message });
        assert_eq!(descriptor.method, Method::POST);
        assert_eq!(descriptor.data, Some(json!({"from": "data"})));
        assert_eq!(Value::Object(descriptor.params), json!({"q": "x"}));

        let payload_only = Overrides::default().method("put").payload(json!("raw"));
        let descriptor = fixture.build(&payload_only, BuildMode::Deferred);
        assert_eq!(descriptor.data, Some(json!("raw")));
    }

    #[test]
    fn bearer_token_wins_over_caller_header() {
        let fixture = Fixture::new(Some(
            EndpointProfile::new("api", "https://api.example.com").with_bearer_token("tok1"),
        ));
        let overrides = Overrides::default()
            .url("/items")
            .param("limit", json!(5))
            .header("authorization", json!("Bearer caller"));
        let message = obj(json!({}));
        let descriptor = fixture.build(&overrides, BuildMode::Eager { message: &message });
        assert_eq!(descriptor.headers.len(), 1);
        assert_eq!(descriptor.headers["Authorization"], json!("Bearer tok1"));
        assert_eq!(Value::Object(descriptor.params), json!({"limit": 5}));
        assert_eq!(descriptor.base_url, "https://api.example.com");
        assert_eq!(descriptor.url, "/items");
    }

    #[test]
    fn header_mappings_resolve_against_message_and_lose_to_caller() {
        let mut fixture = Fixture::new(None);
        fixture.defaults.headers = serde_json::from_value(json!([
            {"keyType": "str", "keyValue": "X-Trace", "valueType": "msg", "valueValue": "trace"},
            {"keyType": "str", "keyValue": "X-Mode", "valueType": "str", "valueValue": "mapping"}
        ]))
        .unwrap();
        let message = obj(json!({"trace": "t-1"}));
        let overrides = Overrides::default().header("x-mode", json!("caller"));
        let descriptor = fixture.build(&overrides, BuildMode::Eager { message: &message });
        assert_eq!(
            Value::Object(descriptor.headers),
            json!({"X-Trace": "t-1", "x-mode": "caller"})
        );
    }

    #[test]
    fn api_key_from_global_scope_overrides_caller_header() {
        let fixture = Fixture::new(Some(EndpointProfile::new("api", "").with_api_key(
            "{{global.key}}",
            "X-Api-Key",
            ApiKeyLocation::Headers,
        )));
        fixture.global.set("key", json!("secret123"));
        let overrides = Overrides::default().header("x-api-key", json!("caller"));
        for mode in [BuildMode::Deferred, BuildMode::Eager { message: &Map::new() }] {
            let descriptor = fixture.build(&overrides, mode);
            assert_eq!(Value::Object(descriptor.headers), json!({"X-Api-Key": "secret123"}));
        }
    }

    #[test]
    fn api_key_merges_into_params_and_data() {
        let fixture = Fixture::new(Some(EndpointProfile::new("api", "").with_api_key(
            "k1",
            "api_key",
            ApiKeyLocation::Params,
        )));
        let overrides = Overrides::default().param("api_key", json!("caller")).param("q", json!(1));
        let descriptor = fixture.build(&overrides, BuildMode::Deferred);
        assert_eq!(Value::Object(descriptor.params), json!({"api_key": "k1", "q": 1}));

        let fixture = Fixture::new(Some(EndpointProfile::new("api", "").with_api_key(
            "k1",
            "key",
            ApiKeyLocation::Data,
        )));
        let overrides = Overrides::default().method("post").data(json!({"name": "n"}));
        let descriptor = fixture.build(&overrides, BuildMode::Deferred);
        assert_eq!(descriptor.data, Some(json!({"name": "n", "key": "k1"})));
    }

    #[test]
    fn api_key_injection_is_idempotent() {
        let fixture = Fixture::new(None);
        let mut descriptor = fixture.build(&Overrides::default(), BuildMode::Deferred);
        inject_api_key(&mut descriptor, ApiKeyLocation::Headers, "X-Api-Key", json!("v"));
        let once = descriptor.headers.clone();
        inject_api_key(&mut descriptor, ApiKeyLocation::Headers, "X-Api-Key", json!("v"));
        assert_eq!(descriptor.headers, once);
    }

    #[test]
    fn unresolved_api_key_reference_is_skipped() {
        let fixture = Fixture::new(Some(EndpointProfile::new("api", "").with_api_key(
            "{{flow.missing}}",
            "X-Api-Key",
            ApiKeyLocation::Headers,
        )));
        let descriptor = fixture.build(&Overrides::default(), BuildMode::Deferred);
        assert!(descriptor.headers.is_empty());
    }

    #[test]
    fn missing_profile_yields_bare_descriptor() {
        let mut fixture = Fixture::new(None);
        fixture.defaults.url = Some("https://fallback.test/x".to_string());
        let descriptor = fixture.build(&Overrides::default(), BuildMode::Deferred);
        assert_eq!(descriptor.base_url, "");
        assert_eq!(descriptor.url, "https://fallback.test/x");
        assert!(descriptor.basic_auth.is_none());
        assert!(descriptor.proxy.is_none());
        assert!(descriptor.headers.is_empty());
        assert!(descriptor.validate_status);
        assert_eq!(descriptor.timeout_ms, 30_000);
    }

    #[test]
    fn basic_auth_and_bearer_coexist() {
        let fixture = Fixture::new(Some(
            EndpointProfile::new("api", "https://api.example.com")
                .with_basic_auth("bob", "pw")
                .with_bearer_token("tok"),
        ));
        let descriptor = fixture.build(&Overrides::default(), BuildMode::Deferred);
        assert_eq!(descriptor.basic_auth, Some(Credentials::new("bob", "pw")));
        assert_eq!(descriptor.headers["Authorization"], json!("Bearer tok"));
    }

    #[test]
    fn from_message_ignores_wrong_shapes() {
        let message = obj(json!({
            "method": "post",
            "url": "/x",
            "params": "not-an-object",
            "headers": {"A": "1"},
            "payload": null
        }));
        let overrides = Overrides::from_message(&message);
        assert_eq!(overrides.method.as_deref(), Some("post"));
        assert_eq!(overrides.url.as_deref(), Some("/x"));
        assert!(overrides.params.is_empty());
        assert_eq!(Value::Object(overrides.headers), json!({"A": "1"}));
        assert!(overrides.payload.is_none());
    }
}
