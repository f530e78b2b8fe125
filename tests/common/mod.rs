#![allow(dead_code)]

use once_cell::sync::Lazy;
use qurl::managers::request_node::RequestNode;
use qurl::services::agents::AgentPool;
use qurl::services::config::NodeConfig;
use qurl::services::context::{FlowContext, MemoryStore};
use qurl::services::logger::{LogLevel, Logger};
use qurl::services::profile::{EndpointProfile, ProfileRegistry};
use qurl::services::request_config::{
    BuildMode, Overrides, RequestConfigBuilder, RequestDescriptor, UnitDefaults,
};
use qurl::services::status::{Indicator, NodeStatus, NoopStatusSink, StatusSink};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Default)]
pub struct RecordingSink {
    statuses: StdMutex<Vec<Option<NodeStatus>>>,
    errors: StdMutex<Vec<String>>,
}

impl RecordingSink {
    pub fn statuses(&self) -> Vec<Option<NodeStatus>> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn last_indicator(&self) -> Option<Indicator> {
        self.statuses
            .lock()
            .unwrap()
            .last()
            .cloned()
            .flatten()
            .map(|status| status.indicator)
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingSink {
    fn status(&self, status: Option<NodeStatus>) {
        self.statuses.lock().unwrap().push(status);
    }

    fn error(&self, message: &str, _details: Option<&Value>) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

pub fn quiet_logger() -> Logger {
    Logger::new("qurl-test").with_level(LogLevel::Error)
}

pub fn obj(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

pub struct Scopes {
    pub flow: Arc<MemoryStore>,
    pub global: Arc<MemoryStore>,
}

impl Scopes {
    pub fn new() -> Self {
        Self {
            flow: Arc::new(MemoryStore::new()),
            global: Arc::new(MemoryStore::new()),
        }
    }

    pub fn context(&self) -> FlowContext {
        FlowContext::new(self.flow.clone(), self.global.clone())
    }
}

pub fn registry_with(profile: EndpointProfile) -> ProfileRegistry {
    let mut registry = ProfileRegistry::new();
    registry.insert(profile);
    registry
}

pub fn node(
    config: Value,
    registry: &ProfileRegistry,
    context: FlowContext,
    sink: Arc<RecordingSink>,
) -> RequestNode {
    let config: NodeConfig = serde_json::from_value(config).unwrap();
    RequestNode::new("n1", &config, registry, context, sink, &quiet_logger()).unwrap()
}

/// Descriptor built the way a bound callable builds it.
pub fn descriptor(
    profile: Option<&EndpointProfile>,
    defaults: &UnitDefaults,
    overrides: &Overrides,
) -> RequestDescriptor {
    let agents = Arc::new(AgentPool::new(profile, false, &NoopStatusSink).unwrap());
    RequestConfigBuilder::new(profile, defaults, &FlowContext::empty(), &agents)
        .build(overrides, BuildMode::Deferred)
        .unwrap()
}

/// A local URL nothing listens on.
pub fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}
