//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::HeaderMap,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use request_gateway::auth::{
    AuthGate, Credentials, IdentityServiceError, Profile, ProfileStore, Session, SessionResolver,
};
use request_gateway::config::{Environment, GatewayConfig};
use request_gateway::data::ErrorEnvelope;
use request_gateway::{HttpServer, Shutdown};

/// 2100-01-01, far enough for any test session.
pub const FAR_FUTURE: u64 = 4_102_444_800;

pub const USER_TOKEN: &str = "user-token";
pub const ADMIN_TOKEN: &str = "admin-token";
/// Valid session whose profile row cannot be read.
pub const ORPHAN_TOKEN: &str = "orphan-token";

#[derive(Default)]
pub struct FakeSessions {
    sessions: HashMap<String, Session>,
}

#[async_trait]
impl SessionResolver for FakeSessions {
    async fn resolve(&self, credentials: &Credentials) -> Result<Option<Session>, IdentityServiceError> {
        Ok(self.sessions.get(credentials.token()).cloned())
    }
}

#[derive(Default)]
pub struct FakeProfiles {
    roles: HashMap<String, String>,
}

#[async_trait]
impl ProfileStore for FakeProfiles {
    async fn fetch_profile(&self, user_id: &str) -> Result<Profile, ErrorEnvelope> {
        self.roles
            .get(user_id)
            .map(|role| Profile {
                user_id: user_id.to_string(),
                role: role.clone(),
            })
            .ok_or_else(|| ErrorEnvelope::new(Some("PGRST116"), "profile not found"))
    }
}

/// Auth gate backed by in-memory sessions: `user-1` (user),
/// `admin-1` (admin) and `orphan-1` (no profile row).
pub fn test_gate(config: &GatewayConfig) -> AuthGate {
    let mut sessions = FakeSessions::default();
    let mut profiles = FakeProfiles::default();

    for (token, user_id, role) in [
        (USER_TOKEN, "user-1", Some("user")),
        (ADMIN_TOKEN, "admin-1", Some("admin")),
        (ORPHAN_TOKEN, "orphan-1", None),
    ] {
        sessions.sessions.insert(
            token.to_string(),
            Session {
                user_id: user_id.to_string(),
                expires_at: FAR_FUTURE,
                role: None,
            },
        );
        if let Some(role) = role {
            profiles.roles.insert(user_id.to_string(), role.to_string());
        }
    }

    AuthGate::new(Arc::new(sessions), Arc::new(profiles), &config.identity)
}

/// Development config with a small default rate limit.
pub fn test_config(max_requests: u32) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.environment = Environment::Development;
    config.rate_limit.max_requests = max_requests;
    config.rate_limit.window_secs = 60;
    config
}

/// Start an upstream application that echoes what it received.
pub async fn start_echo_upstream() -> SocketAddr {
    let app = Router::new().fallback(|request: Request| async move {
        let headers = request.headers().clone();
        Json(json!({
            "method": request.method().as_str(),
            "path": request.uri().path(),
            "query": request.uri().query(),
            "user_id": header(&headers, "x-gateway-user-id"),
            "user_role": header(&headers, "x-gateway-user-role"),
        }))
    });

    serve(app).await
}

/// Serve `app` on an ephemeral port for the rest of the test.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Run `app` behind [`HttpServer`] and return its address and shutdown handle.
pub async fn start_gateway(app: Router) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        HttpServer::new(app).run(listener, receiver).await.unwrap();
    });
    (addr, shutdown)
}

/// An address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn header(headers: &HeaderMap, name: &str) -> Value {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| Value::String(v.to_string()))
        .unwrap_or(Value::Null)
}
