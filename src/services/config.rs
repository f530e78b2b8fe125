use crate::constants::network;
use crate::errors::QurlError;
use crate::services::context::{FlowContext, MemoryStore};
use crate::services::profile::EndpointConfig;
use crate::services::request_config::{MethodPolicy, ResponseType};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Unit section of the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    pub endpoint: Option<String>,
    pub method: MethodPolicy,
    pub url: Option<String>,
    pub timeout: u64,
    pub response_type: ResponseType,
    pub validate_status: bool,
    pub keep_alive: bool,
    /// Field mappings, kept raw so that a malformed list degrades instead of
    /// failing the whole file.
    pub headers: Value,
    pub params: Value,
    pub use_qurl: bool,
    pub verbose_out: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            method: MethodPolicy::default(),
            url: None,
            timeout: network::TIMEOUT_REQUEST_MS,
            response_type: ResponseType::default(),
            validate_status: true,
            keep_alive: false,
            headers: Value::Null,
            params: Value::Null,
            use_qurl: true,
            verbose_out: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QurlConfig {
    pub endpoints: HashMap<String, EndpointConfig>,
    pub nodes: HashMap<String, NodeConfig>,
    /// Seed values of the flow scope.
    pub flow: Map<String, Value>,
    /// Seed values of the global scope.
    pub global: Map<String, Value>,
}

impl NodeConfig {
    /// Request timeout in milliseconds; `0` falls back to the default.
    pub fn timeout_ms(&self) -> u64 {
        if self.timeout == 0 {
            network::TIMEOUT_REQUEST_MS
        } else {
            self.timeout
        }
    }
}

impl QurlConfig {
    pub fn parse(raw: &str) -> Result<Self, QurlError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, QurlError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(QurlError::not_found(format!(
                    "Config file not found: {}",
                    path.display()
                ))
                .with_hint("Pass --config or set QURL_CONFIG_PATH."));
            }
            Err(err) => return Err(err.into()),
        };
        Self::parse(&raw).map_err(|err| {
            err.with_details(serde_json::json!({ "path": path.display().to_string() }))
        })
    }

    pub fn node(&self, id: &str) -> Result<&NodeConfig, QurlError> {
        self.nodes.get(id).ok_or_else(|| {
            let mut known: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
            known.sort_unstable();
            QurlError::not_found(format!("Unknown node: {}", id))
                .with_details(serde_json::json!({ "known": known }))
        })
    }

    /// Fresh in-memory stores seeded from the file.
    pub fn context(&self) -> FlowContext {
        FlowContext::new(
            Arc::new(MemoryStore::from_map(&self.flow)),
            Arc::new(MemoryStore::from_map(&self.global)),
        )
    }
}
