use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Read side of a host-owned key/value scope.
pub trait VariableStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Flow,
    Global,
}

impl Scope {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "flow" => Some(Scope::Flow),
            "global" => Some(Scope::Global),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Flow => "flow",
            Scope::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: &Map<String, Value>) -> Self {
        Self {
            values: RwLock::new(
                values
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            ),
        }
    }

    pub fn set(&self, key: &str, value: Value) {
        self.values
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .insert(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .remove(key)
    }
}

impl VariableStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(key)
            .cloned()
    }
}

/// Flow- and global-scoped stores visible to one unit.
#[derive(Clone)]
pub struct FlowContext {
    flow: Arc<dyn VariableStore>,
    global: Arc<dyn VariableStore>,
}

impl FlowContext {
    pub fn new(flow: Arc<dyn VariableStore>, global: Arc<dyn VariableStore>) -> Self {
        Self { flow, global }
    }

    pub fn empty() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    pub fn store(&self, scope: Scope) -> &dyn VariableStore {
        match scope {
            Scope::Flow => self.flow.as_ref(),
            Scope::Global => self.global.as_ref(),
        }
    }

    pub fn get(&self, scope: Scope, key: &str) -> Option<Value> {
        self.store(scope).get(key)
    }
}

impl fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowContext").finish_non_exhaustive()
    }
}
