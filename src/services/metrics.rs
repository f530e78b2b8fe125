use crate::services::status::{Indicator, NodeStatus, StatusSink};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsState {
    pub in_flight: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_latency_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
    Settled { last_success: bool },
}

/// Start marker of one execution. Dropping it unfinished, for example when
/// the request future is cancelled, settles the execution as an error.
#[must_use = "dropping the token settles the execution as an error"]
pub struct ExecToken<'a> {
    tracker: &'a MetricsTracker,
    started: Instant,
    settled: bool,
}

impl ExecToken<'_> {
    pub fn finish(mut self, success: bool) {
        self.settled = true;
        self.tracker.settle(self.started, success);
    }
}

impl Drop for ExecToken<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.settle(self.started, false);
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: MetricsState,
    last_success: Option<bool>,
}

impl Inner {
    fn phase(&self) -> Phase {
        if self.state.in_flight > 0 {
            return Phase::Running;
        }
        match self.last_success {
            None => Phase::Idle,
            Some(last_success) => Phase::Settled { last_success },
        }
    }

    fn label(&self) -> String {
        format!(
            "s={}, err={}, rt={}ms",
            self.state.success_count, self.state.error_count, self.state.last_latency_ms
        )
    }

    fn status(&self) -> Option<NodeStatus> {
        let indicator = match self.phase() {
            Phase::Idle => return None,
            Phase::Running => Indicator::Busy,
            Phase::Settled { last_success: true } => Indicator::Ok,
            Phase::Settled { last_success: false } => Indicator::Error,
        };
        Some(NodeStatus::dot(indicator, self.label()))
    }
}

/// Live execution counters of one unit, pushed to its status sink on every
/// transition. Updates never await, so the lock is only held briefly.
pub struct MetricsTracker {
    inner: Mutex<Inner>,
    sink: Arc<dyn StatusSink>,
}

impl MetricsTracker {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            sink,
        }
    }

    pub fn start(&self) -> ExecToken<'_> {
        let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        inner.state.in_flight += 1;
        self.sink.status(inner.status());
        ExecToken {
            tracker: self,
            started: Instant::now(),
            settled: false,
        }
    }

    pub fn finish(&self, token: ExecToken<'_>, success: bool) {
        token.finish(success);
    }

    fn settle(&self, started: Instant, success: bool) {
        let latency = started.elapsed().as_millis();
        let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        inner.state.in_flight = inner.state.in_flight.saturating_sub(1);
        inner.state.last_latency_ms = u64::try_from(latency).unwrap_or(u64::MAX);
        if success {
            inner.state.success_count += 1;
        } else {
            inner.state.error_count += 1;
        }
        inner.last_success = Some(success);
        self.sink.status(inner.status());
    }

    pub fn snapshot(&self) -> MetricsState {
        self.inner.lock().unwrap_or_else(|err| err.into_inner()).state
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().unwrap_or_else(|err| err.into_inner()).phase()
    }

    pub fn status(&self) -> Option<NodeStatus> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner()).status()
    }
}
