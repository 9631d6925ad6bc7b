//! HTTP server setup and gateway wiring.
//!
//! # Responsibilities
//! - Compose the gateway layers around an application router
//! - Provide auth layers for protected and admin-only routers
//! - Build the upstream-forwarding application used by the binary
//! - Serve with graceful shutdown
//!
//! # Layer order (outermost first)
//! ```text
//! request id → trace → propagate request id → security headers
//!     → timeout → pipeline (rate limit → CSRF) → data access extension
//!     → routes [→ auth] → handler
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::middleware::{require_admin, require_auth};
use crate::auth::AuthGate;
use crate::config::GatewayConfig;
use crate::data::{DataAccess, ErrorClassifier};
use crate::http::pipeline::{gateway_middleware, Pipeline};
use crate::http::upstream::{upstream_handler, UpstreamState};
use crate::security::headers::security_headers;
use crate::security::RateLimiter;

pub const HEALTH_PATH: &str = "/healthz";

/// The composed request security gateway.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    pipeline: Arc<Pipeline>,
    gate: Arc<AuthGate>,
    data: DataAccess,
}

impl Gateway {
    /// Gateway with a process-local rate limit table.
    pub fn new(config: GatewayConfig, gate: AuthGate) -> Self {
        let limiter = Arc::new(RateLimiter::in_memory(&config.rate_limit));
        Self::with_rate_limiter(config, gate, limiter)
    }

    pub fn with_rate_limiter(config: GatewayConfig, gate: AuthGate, limiter: Arc<RateLimiter>) -> Self {
        let pipeline = Arc::new(Pipeline::standard(&config, limiter));
        let data = DataAccess::new(Arc::new(ErrorClassifier::from_config(&config.data_access)));

        tracing::info!(
            stages = ?pipeline.stage_names(),
            environment = ?config.environment,
            "Gateway pipeline composed"
        );

        Self {
            config: Arc::new(config),
            pipeline,
            gate: Arc::new(gate),
            data,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn gate(&self) -> Arc<AuthGate> {
        self.gate.clone()
    }

    /// Data access wrapper configured with this gateway's classifier.
    ///
    /// Handlers inside [`Gateway::wrap`] should extract [`DataAccess`]
    /// instead, which attributes log lines to the caller.
    pub fn data_access(&self) -> DataAccess {
        self.data.clone()
    }

    /// Require an authenticated session on every route of `router`.
    pub fn protect<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(middleware::from_fn_with_state(self.gate.clone(), require_auth))
    }

    /// Require the admin role on every route of `router`.
    pub fn admin_only<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(middleware::from_fn_with_state(self.gate.clone(), require_admin))
    }

    /// Wrap an application router in the gateway layers and add the
    /// liveness endpoint.
    #[allow(deprecated)]
    pub fn wrap(&self, app: Router) -> Router {
        app.route(HEALTH_PATH, get(health))
            .layer(Extension(self.data.clone()))
            .layer(middleware::from_fn_with_state(self.pipeline.clone(), gateway_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(middleware::map_response(security_headers))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Application forwarding admitted requests to `upstream`.
    pub fn upstream_app(&self, upstream: SocketAddr) -> Result<Router, axum::http::Error> {
        let state = UpstreamState::new(&self.config, self.gate.clone(), upstream)?;
        Ok(Router::new().fallback(upstream_handler).with_state(state))
    }
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Serve until the shutdown signal fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
