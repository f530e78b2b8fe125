use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::constants::message as fields;
use crate::errors::QurlError;
use crate::managers::deferred::{bind, BoundRequest};
use crate::services::agents::AgentPool;
use crate::services::config::NodeConfig;
use crate::services::context::FlowContext;
use crate::services::http_executor::{HttpExecutor, ResultEnvelope, SendError};
use crate::services::logger::Logger;
use crate::services::metrics::{MetricsState, MetricsTracker, Phase};
use crate::services::profile::{EndpointProfile, ProfileRegistry};
use crate::services::request_config::{
    BuildMode, Overrides, RequestConfigBuilder, RequestDescriptor, UnitDefaults,
};
use crate::services::status::StatusSink;
use crate::services::typed_value::parse_mappings;
use crate::utils::redact::{redact_headers, redact_params};

/// A trigger event: request fields plus, in deferred mode, the attached
/// callable.
#[derive(Debug, Clone, Default)]
pub struct TriggerMessage {
    pub body: Map<String, Value>,
    pub qurl: Option<BoundRequest>,
}

impl TriggerMessage {
    pub fn new(body: Map<String, Value>) -> Self {
        Self { body, qurl: None }
    }
}

pub struct RequestNode {
    id: String,
    deferred: bool,
    verbose: bool,
    profile: Option<Arc<EndpointProfile>>,
    defaults: Arc<UnitDefaults>,
    context: FlowContext,
    agents: Arc<AgentPool>,
    executor: HttpExecutor,
    metrics: MetricsTracker,
    bound: BoundRequest,
    logger: Logger,
}

impl RequestNode {
    /// Configuration problems are reported to `sink` and the unit runs
    /// degraded. Only a client that cannot be built at all is an error.
    pub fn new(
        id: &str,
        config: &NodeConfig,
        registry: &ProfileRegistry,
        context: FlowContext,
        sink: Arc<dyn StatusSink>,
        logger: &Logger,
    ) -> Result<Self, QurlError> {
        let logger = logger.child(id);

        let profile = config.endpoint.as_deref().and_then(|endpoint| {
            let found = registry.get(endpoint);
            if found.is_none() {
                logger.debug(
                    "endpoint not found; running without a profile",
                    Some(&serde_json::json!({ "endpoint": endpoint })),
                );
            }
            found
        });

        let (headers, header_errors) = parse_mappings(&config.headers, "headers");
        let (params, param_errors) = parse_mappings(&config.params, "params");
        for err in header_errors.iter().chain(param_errors.iter()) {
            sink.error(&err.message, err.details.as_ref());
        }

        let defaults = Arc::new(UnitDefaults {
            method: config.method.clone(),
            url: config.url.clone().filter(|url| !url.is_empty()),
            timeout_ms: config.timeout_ms(),
            response_type: config.response_type,
            validate_status: config.validate_status,
            headers,
            params,
        });
        let agents = Arc::new(AgentPool::new(
            profile.as_deref(),
            config.keep_alive,
            sink.as_ref(),
        )?);
        let bound = bind(
            profile.clone(),
            defaults.clone(),
            context.clone(),
            agents.clone(),
            &logger,
        );

        sink.status(None);
        Ok(Self {
            id: id.to_string(),
            deferred: config.use_qurl,
            verbose: config.verbose_out,
            profile,
            defaults,
            context,
            agents,
            executor: HttpExecutor::new(&logger),
            metrics: MetricsTracker::new(sink),
            bound,
            logger,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn bind(&self) -> BoundRequest {
        self.bound.clone()
    }

    pub fn metrics(&self) -> MetricsState {
        self.metrics.snapshot()
    }

    pub fn phase(&self) -> Phase {
        self.metrics.phase()
    }

    /// Deferred mode attaches the callable and does no I/O. Eager mode sends
    /// the request and writes the response onto the message; a rejected
    /// status still fills `payload`, `headers` and `statusCode` before the
    /// error is returned.
    pub async fn handle_input(&self, message: &mut TriggerMessage) -> Result<(), QurlError> {
        if self.deferred {
            message.qurl = Some(self.bind());
            return Ok(());
        }

        let token = self.metrics.start();
        let result = self.run_eager(&mut message.body).await;
        self.metrics.finish(token, result.is_ok());
        result
    }

    async fn run_eager(&self, body: &mut Map<String, Value>) -> Result<(), QurlError> {
        let overrides = Overrides::from_message(body);
        let descriptor = RequestConfigBuilder::new(
            self.profile.as_deref(),
            &self.defaults,
            &self.context,
            &self.agents,
        )
        .with_logger(&self.logger)
        .build(&overrides, BuildMode::Eager { message: body })?;

        let invocation = Uuid::new_v4();
        self.log_request(&invocation, &descriptor);
        let started = Instant::now();

        match self.executor.send(&descriptor).await {
            Ok(envelope) => {
                self.logger.info(
                    "request completed",
                    Some(&serde_json::json!({
                        "invocation": invocation,
                        "status": envelope.status_code,
                        "duration_ms": started.elapsed().as_millis() as u64,
                    })),
                );
                self.write_success(body, envelope);
                Ok(())
            }
            Err(SendError::Rejected(envelope)) => {
                self.logger.warn(
                    "request rejected by status",
                    Some(&serde_json::json!({
                        "invocation": invocation,
                        "status": envelope.status_code,
                        "duration_ms": started.elapsed().as_millis() as u64,
                    })),
                );
                let status = envelope.status_code;
                write_partial(body, envelope);
                Err(QurlError::http_status(status))
            }
            Err(SendError::Failed(err)) => {
                self.logger.error(
                    "request failed",
                    Some(&serde_json::json!({
                        "invocation": invocation,
                        "kind": err.kind,
                        "error": err.message,
                    })),
                );
                Err(err)
            }
        }
    }

    fn log_request(&self, invocation: &Uuid, descriptor: &RequestDescriptor) {
        let names = descriptor.secret_names(self.profile.as_deref());
        let extra: Vec<&str> = names.iter().map(String::as_str).collect();
        self.logger.debug(
            "sending request",
            Some(&serde_json::json!({
                "invocation": invocation,
                "method": descriptor.method.as_str(),
                "base_url": descriptor.base_url,
                "url": descriptor.url,
                "params": redact_params(&descriptor.params, &extra),
                "headers": redact_headers(&descriptor.headers, &extra),
                "has_body": descriptor.data.is_some(),
            })),
        );
    }

    fn write_success(&self, body: &mut Map<String, Value>, envelope: ResultEnvelope) {
        body.insert(fields::PAYLOAD.to_string(), envelope.payload);
        if !self.verbose {
            body.remove(fields::URL);
            body.remove(fields::PARAMS);
            body.remove(fields::HEADERS);
            return;
        }
        body.insert(fields::STATUS_CODE.to_string(), Value::from(envelope.status_code));
        body.insert(fields::HEADERS.to_string(), Value::Object(envelope.headers));
        body.insert(
            fields::RESPONSE_URL.to_string(),
            envelope.response_url.map(Value::String).unwrap_or(Value::Null),
        );
        body.insert(
            fields::REDIRECT_LIST.to_string(),
            Value::Array(
                envelope
                    .redirect_list
                    .unwrap_or_default()
                    .into_iter()
                    .map(|hop| hop.into_value())
                    .collect(),
            ),
        );
    }
}

fn write_partial(body: &mut Map<String, Value>, envelope: ResultEnvelope) {
    body.insert(fields::PAYLOAD.to_string(), envelope.payload);
    body.insert(fields::HEADERS.to_string(), Value::Object(envelope.headers));
    body.insert(fields::STATUS_CODE.to_string(), Value::from(envelope.status_code));
}

impl fmt::Debug for RequestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestNode")
            .field("id", &self.id)
            .field("deferred", &self.deferred)
            .field("verbose", &self.verbose)
            .field("endpoint", &self.profile.as_ref().map(|p| p.id.as_str()))
            .finish_non_exhaustive()
    }
}
