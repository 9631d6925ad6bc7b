//! Ordered request interceptor chain.
//!
//! Stages run in a fixed order that is decided once at startup. Each returns
//! either `Continue` (optionally carrying headers for the eventual response)
//! or `Respond`, which ends the request.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};

use crate::config::GatewayConfig;
use crate::security::{ClientIdentity, CsrfStage, CsrfValidator, RateLimitStage, RateLimiter};

/// What a stage sees of the request.
#[derive(Debug)]
pub struct RequestContext<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    pub identity: &'a ClientIdentity,
}

/// Result of one stage.
#[derive(Debug)]
pub enum StageOutcome {
    /// Proceed; the headers are added to the final response.
    Continue(HeaderMap),
    /// Stop and send this response.
    Respond(Response),
}

impl StageOutcome {
    pub fn proceed() -> Self {
        StageOutcome::Continue(HeaderMap::new())
    }
}

/// One gateway check. Stages must not block.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &RequestContext<'_>) -> StageOutcome;
}

/// Result of running the whole chain.
#[derive(Debug)]
pub enum PipelineOutcome {
    Continue(HeaderMap),
    Respond(Response),
}

#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Rate limit, then CSRF.
    pub fn standard(config: &GatewayConfig, limiter: Arc<RateLimiter>) -> Self {
        let mut pipeline = Self::new().with_stage(RateLimitStage::new(limiter));
        if config.csrf.enabled {
            pipeline = pipeline.with_stage(CsrfStage::new(
                CsrfValidator::from_config(&config.csrf),
                !config.environment.is_production(),
            ));
        }
        pipeline
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order, stopping at the first `Respond`.
    pub fn run(&self, ctx: &RequestContext<'_>) -> PipelineOutcome {
        let mut collected = HeaderMap::new();
        for stage in &self.stages {
            match stage.evaluate(ctx) {
                StageOutcome::Continue(headers) => collected.extend(headers),
                StageOutcome::Respond(mut response) => {
                    tracing::debug!(stage = stage.name(), status = %response.status(), "Request stopped by stage");
                    // Keep headers from earlier stages (e.g. rate limit state on a CSRF rejection).
                    for (name, value) in collected.iter() {
                        response.headers_mut().entry(name).or_insert_with(|| value.clone());
                    }
                    return PipelineOutcome::Respond(response);
                }
            }
        }
        PipelineOutcome::Continue(collected)
    }
}

/// Axum middleware running the [`Pipeline`].
///
/// The resolved [`ClientIdentity`] is stored in request extensions for later
/// layers and handlers.
pub async fn gateway_middleware(
    State(pipeline): State<Arc<Pipeline>>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = ClientIdentity::resolve(request.headers());

    let outcome = {
        let ctx = RequestContext {
            method: request.method(),
            path: request.uri().path(),
            headers: request.headers(),
            identity: &identity,
        };
        pipeline.run(&ctx)
    };

    match outcome {
        PipelineOutcome::Respond(response) => response,
        PipelineOutcome::Continue(headers) => {
            request.extensions_mut().insert(identity);
            let mut response = next.run(request).await;
            response.headers_mut().extend(headers);
            response
        }
    }
}
