//! Forwarding of admitted requests to the upstream application.
//!
//! The route table decides the access level; the auth gate runs once for
//! protected routes; the verified user is passed upstream in
//! `x-gateway-user-*` headers. Client-supplied copies of those headers are
//! always dropped. Nothing is retried.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header,
        uri::{Authority, PathAndQuery, Scheme},
        HeaderName, HeaderValue, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Json,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::json;

use crate::auth::{AuthGate, AuthenticatedUser};
use crate::config::{AccessLevel, GatewayConfig};
use crate::observability::metrics;
use crate::routing::{RequestTarget, RouteTable};

pub const X_GATEWAY_USER_ID: HeaderName = HeaderName::from_static("x-gateway-user-id");
pub const X_GATEWAY_USER_ROLE: HeaderName = HeaderName::from_static("x-gateway-user-role");

/// State for the upstream handler.
#[derive(Clone)]
pub struct UpstreamState {
    pub routes: Arc<RouteTable>,
    pub gate: Arc<AuthGate>,
    pub client: Client<HttpConnector, Body>,
    pub upstream: Authority,
}

impl UpstreamState {
    pub fn new(config: &GatewayConfig, gate: Arc<AuthGate>, upstream: SocketAddr) -> Result<Self, axum::http::Error> {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            routes: Arc::new(RouteTable::from_config(&config.routes)),
            gate,
            client,
            upstream: Authority::try_from(upstream.to_string().as_str())?,
        })
    }
}

/// Route, authorize and forward one request.
pub async fn upstream_handler(State(state): State<UpstreamState>, request: Request) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let response = forward(&state, request).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

async fn forward(state: &UpstreamState, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();

    let host = parts.headers.get(header::HOST).and_then(|v| v.to_str().ok());
    let target = RequestTarget {
        host,
        path: parts.uri.path(),
    };
    let Some(route) = state.routes.match_target(&target) else {
        tracing::warn!(path = %parts.uri.path(), "No route matched");
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response();
    };

    let credentials = state.gate.credentials(&parts.headers);
    let user = match route.access {
        AccessLevel::Public => None,
        AccessLevel::Authenticated => match state.gate.require_auth(credentials.as_ref()).await {
            Ok(user) => Some(user),
            Err(e) => return e.into_response(),
        },
        AccessLevel::Admin => match state.gate.require_admin(credentials.as_ref()).await {
            Ok(user) => Some(user),
            Err(e) => return e.into_response(),
        },
    };

    tracing::debug!(route = %route.name, path = %parts.uri.path(), user = ?user.as_ref().map(|u| &u.user_id), "Forwarding request");

    parts.headers.remove(X_GATEWAY_USER_ID);
    parts.headers.remove(X_GATEWAY_USER_ROLE);
    if let Some(user) = &user {
        attach_user(&mut parts.headers, user);
    }

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.upstream.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build upstream URI");
            return bad_gateway();
        }
    };

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(upstream = %state.upstream, error = %e, "Upstream error");
            bad_gateway()
        }
    }
}

fn attach_user(headers: &mut axum::http::HeaderMap, user: &AuthenticatedUser) {
    match HeaderValue::from_str(&user.user_id) {
        Ok(value) => {
            headers.insert(X_GATEWAY_USER_ID, value);
        }
        Err(_) => tracing::warn!("User id is not a valid header value; not forwarded"),
    }
    if let Some(role) = user.role {
        headers.insert(X_GATEWAY_USER_ROLE, HeaderValue::from_static(role.as_str()));
    }
}

fn bad_gateway() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": "Upstream request failed" })),
    )
        .into_response()
}
