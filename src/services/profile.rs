use crate::constants::network::DEFAULT_PROXY_PROTOCOL;
use crate::services::status::StatusSink;
use crate::utils::paths::expand_home_path;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn from_parts(username: &Option<String>, password: &Option<String>) -> Option<Self> {
        match (non_empty(username), non_empty(password)) {
            (Some(username), Some(password)) => Some(Self::new(username, password)),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxySettings {
    pub protocol: String,
    pub host: String,
    pub port: Option<u16>,
    pub auth: Option<Credentials>,
}

impl ProxySettings {
    pub fn url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.protocol, self.host, port),
            None => format!("{}://{}", self.protocol, self.host),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Headers,
    Params,
    Data,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    /// Either the key itself or a `{{scope.key}}` reference.
    pub value: String,
    pub name: String,
    pub location: ApiKeyLocation,
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("value", &"[REDACTED]")
            .field("name", &self.name)
            .field("location", &self.location)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub bearer_token: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub api_key_value: Option<String>,
}

/// Endpoint section of the configuration file, as the host stores it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointConfig {
    #[serde(rename = "baseURL", alias = "baseUrl")]
    pub base_url: Option<String>,
    pub reject_unauthorized: Option<bool>,
    pub ca_cert_path: Option<String>,
    pub api_key_key: Option<String>,
    pub api_key_add_to: Option<ApiKeyLocation>,
    pub proxy_enabled: bool,
    pub proxy_protocol: Option<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
    pub credentials: EndpointCredentials,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

/// Immutable connection description of one remote endpoint.
#[derive(Debug, Clone)]
pub struct EndpointProfile {
    pub id: String,
    pub base_url: String,
    pub reject_unauthorized: bool,
    pub ca_cert: Option<Vec<u8>>,
    pub basic_auth: Option<Credentials>,
    pub bearer_token: Option<String>,
    pub api_key: Option<ApiKey>,
    pub proxy: Option<ProxySettings>,
}

impl Default for EndpointProfile {
    fn default() -> Self {
        Self {
            id: String::new(),
            base_url: String::new(),
            reject_unauthorized: true,
            ca_cert: None,
            basic_auth: None,
            bearer_token: None,
            api_key: None,
            proxy: None,
        }
    }
}

impl EndpointProfile {
    pub fn new(id: &str, base_url: &str) -> Self {
        Self {
            id: id.to_string(),
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_bearer_token(mut self, token: &str) -> Self {
        self.bearer_token = Some(token.to_string());
        self
    }

    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.basic_auth = Some(Credentials::new(username, password));
        self
    }

    pub fn with_api_key(mut self, value: &str, name: &str, location: ApiKeyLocation) -> Self {
        self.api_key = Some(ApiKey {
            value: value.to_string(),
            name: name.to_string(),
            location,
        });
        self
    }

    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Builds the profile, reading the CA certificate from disk. Unreadable
    /// certificates and half-configured features are reported to `sink` and
    /// left out; loading itself never fails.
    pub fn from_config(id: &str, config: &EndpointConfig, sink: &dyn StatusSink) -> Self {
        let credentials = &config.credentials;

        let ca_cert = non_empty(&config.ca_cert_path).and_then(|raw| {
            let path: PathBuf = expand_home_path(&raw);
            match std::fs::read(&path) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    sink.error(
                        &format!("CA certificate read error: {}", err),
                        Some(&serde_json::json!({ "endpoint": id, "path": path.display().to_string() })),
                    );
                    None
                }
            }
        });

        let api_key = match (
            non_empty(&credentials.api_key_value),
            non_empty(&config.api_key_key),
            config.api_key_add_to,
        ) {
            (Some(value), Some(name), Some(location)) => Some(ApiKey {
                value,
                name,
                location,
            }),
            _ => None,
        };

        let proxy = if config.proxy_enabled {
            match non_empty(&config.proxy_host) {
                Some(host) => Some(ProxySettings {
                    protocol: non_empty(&config.proxy_protocol)
                        .unwrap_or_else(|| DEFAULT_PROXY_PROTOCOL.to_string()),
                    host,
                    port: config.proxy_port,
                    auth: Credentials::from_parts(
                        &credentials.proxy_username,
                        &credentials.proxy_password,
                    ),
                }),
                None => {
                    sink.error(
                        "Proxy is enabled but proxyHost is empty; requests go direct",
                        Some(&serde_json::json!({ "endpoint": id })),
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            id: id.to_string(),
            base_url: non_empty(&config.base_url).unwrap_or_default(),
            reject_unauthorized: config.reject_unauthorized.unwrap_or(true),
            ca_cert,
            basic_auth: Credentials::from_parts(&credentials.username, &credentials.password),
            bearer_token: non_empty(&credentials.bearer_token),
            api_key,
            proxy,
        }
    }
}

/// Profiles addressable by endpoint id.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: HashMap<String, Arc<EndpointProfile>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(endpoints: &HashMap<String, EndpointConfig>, sink: &dyn StatusSink) -> Self {
        let profiles = endpoints
            .iter()
            .map(|(id, config)| {
                (
                    id.clone(),
                    Arc::new(EndpointProfile::from_config(id, config, sink)),
                )
            })
            .collect();
        Self { profiles }
    }

    pub fn insert(&mut self, profile: EndpointProfile) -> Arc<EndpointProfile> {
        let profile = Arc::new(profile);
        self.profiles.insert(profile.id.clone(), profile.clone());
        profile
    }

    pub fn get(&self, id: &str) -> Option<Arc<EndpointProfile>> {
        self.profiles.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.profiles.keys().cloned().collect();
        ids.sort();
        ids
    }
}
