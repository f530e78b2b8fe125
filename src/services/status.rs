use crate::services::logger::Logger;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Busy,
    Ok,
    Error,
}

impl Indicator {
    pub fn fill(self) -> &'static str {
        match self {
            Indicator::Busy => "blue",
            Indicator::Ok => "green",
            Indicator::Error => "red",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub indicator: Indicator,
    pub fill: &'static str,
    pub shape: &'static str,
    pub label: String,
}

impl NodeStatus {
    pub fn dot(indicator: Indicator, label: impl Into<String>) -> Self {
        Self {
            indicator,
            fill: indicator.fill(),
            shape: "dot",
            label: label.into(),
        }
    }
}

/// Host-side display of a unit's state. `None` clears the status.
pub trait StatusSink: Send + Sync {
    fn status(&self, status: Option<NodeStatus>);
    fn error(&self, message: &str, details: Option<&Value>);
}

#[derive(Debug, Clone)]
pub struct LogStatusSink {
    logger: Logger,
}

impl LogStatusSink {
    pub fn new(logger: &Logger) -> Self {
        Self {
            logger: logger.child("status"),
        }
    }
}

impl StatusSink for LogStatusSink {
    fn status(&self, status: Option<NodeStatus>) {
        match status {
            Some(status) => self.logger.info(
                &status.label,
                Some(&serde_json::json!({ "indicator": status.indicator, "fill": status.fill })),
            ),
            None => self.logger.debug("status cleared", None),
        }
    }

    fn error(&self, message: &str, details: Option<&Value>) {
        self.logger.error(message, details);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStatusSink;

impl StatusSink for NoopStatusSink {
    fn status(&self, _status: Option<NodeStatus>) {}

    fn error(&self, _message: &str, _details: Option<&Value>) {}
}
