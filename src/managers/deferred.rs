use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::errors::QurlError;
use crate::services::agents::AgentPool;
use crate::services::context::FlowContext;
use crate::services::http_executor::{HttpExecutor, ResultEnvelope};
use crate::services::logger::Logger;
use crate::services::profile::EndpointProfile;
use crate::services::request_config::{BuildMode, Overrides, RequestConfigBuilder, UnitDefaults};

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn call(&self, overrides: Overrides) -> Result<ResultEnvelope, QurlError>;
}

struct BoundInner {
    profile: Option<Arc<EndpointProfile>>,
    defaults: Arc<UnitDefaults>,
    context: FlowContext,
    agents: Arc<AgentPool>,
    executor: HttpExecutor,
    logger: Logger,
}

/// A unit's profile and defaults packaged as a reusable callable.
///
/// Every call builds and sends its own request; calls share nothing but the
/// pooled clients, so they can run concurrently. Rejected statuses resolve
/// to the downgraded envelope; only failures without a response are errors.
#[derive(Clone)]
pub struct BoundRequest {
    inner: Arc<BoundInner>,
}

pub fn bind(
    profile: Option<Arc<EndpointProfile>>,
    defaults: Arc<UnitDefaults>,
    context: FlowContext,
    agents: Arc<AgentPool>,
    logger: &Logger,
) -> BoundRequest {
    let logger = logger.child("deferred");
    BoundRequest {
        inner: Arc::new(BoundInner {
            profile,
            defaults,
            context,
            agents,
            executor: HttpExecutor::new(&logger),
            logger,
        }),
    }
}

impl BoundRequest {
    pub async fn invoke(&self, overrides: Overrides) -> Result<ResultEnvelope, QurlError> {
        let inner = &self.inner;
        let descriptor = RequestConfigBuilder::new(
            inner.profile.as_deref(),
            &inner.defaults,
            &inner.context,
            &inner.agents,
        )
        .with_logger(&inner.logger)
        .build(&overrides, BuildMode::Deferred)?;

        inner.executor.execute(&descriptor).await.map_err(|err| {
            inner.logger.warn(
                "deferred request failed",
                Some(&serde_json::json!({ "error": err.message, "kind": err.kind })),
            );
            err
        })
    }
}

#[async_trait]
impl RequestHandler for BoundRequest {
    async fn call(&self, overrides: Overrides) -> Result<ResultEnvelope, QurlError> {
        self.invoke(overrides).await
    }
}

impl fmt::Debug for BoundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundRequest")
            .field("endpoint", &self.inner.profile.as_ref().map(|p| p.id.as_str()))
            .finish_non_exhaustive()
    }
}
