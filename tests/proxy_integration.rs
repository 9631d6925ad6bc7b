//! Gateway in front of a live upstream, exercised over real sockets.

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use request_gateway::config::{AccessLevel, GatewayConfig, RouteConfig};
use request_gateway::{Gateway, Shutdown};

mod common;

fn route(name: &str, prefix: &str, access: AccessLevel, priority: u32) -> RouteConfig {
    RouteConfig {
        name: name.into(),
        host: None,
        path_prefix: Some(prefix.into()),
        access,
        priority,
    }
}

fn proxy_config(max_requests: u32) -> GatewayConfig {
    let mut config = common::test_config(max_requests);
    config.routes = vec![
        route("admin", "/api/admin", AccessLevel::Admin, 20),
        route("account", "/api/account", AccessLevel::Authenticated, 10),
        route("public", "/", AccessLevel::Public, 0),
    ];
    config
}

async fn start_proxy(config: GatewayConfig, upstream: SocketAddr) -> (String, Shutdown) {
    let gate = common::test_gate(&config);
    let gateway = Gateway::new(config, gate);
    let app = gateway.wrap(gateway.upstream_app(upstream).unwrap());
    let (addr, shutdown) = common::start_gateway(app).await;
    (format!("http://{addr}"), shutdown)
}

#[tokio::test]
async fn test_public_route_forwards_and_strips_identity_headers() {
    let upstream = common::start_echo_upstream().await;
    let (base, _shutdown) = start_proxy(proxy_config(100), upstream).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base}/posts?page=2"))
        .header("x-gateway-user-id", "admin-1")
        .header("x-gateway-user-role", "admin")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["path"], "/posts");
    assert_eq!(body["query"], "page=2");
    assert!(body["user_id"].is_null());
    assert!(body["user_role"].is_null());
}

#[tokio::test]
async fn test_authenticated_route() {
    let upstream = common::start_echo_upstream().await;
    let (base, _shutdown) = start_proxy(proxy_config(100), upstream).await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{base}/api/account")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("{base}/api/account/settings"))
        .bearer_auth(common::USER_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["path"], "/api/account/settings");
    assert_eq!(body["user_id"], "user-1");
    assert!(body["user_role"].is_null());
}

#[tokio::test]
async fn test_admin_route() {
    let upstream = common::start_echo_upstream().await;
    let (base, _shutdown) = start_proxy(proxy_config(100), upstream).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base}/api/admin/users"))
        .bearer_auth(common::USER_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .get(format!("{base}/api/admin/users"))
        .bearer_auth(common::ORPHAN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = client
        .get(format!("{base}/api/admin/users"))
        .bearer_auth(common::ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user_id"], "admin-1");
    assert_eq!(body["user_role"], "admin");
}

#[tokio::test]
async fn test_mutation_passes_csrf_with_own_origin() {
    let upstream = common::start_echo_upstream().await;
    let (base, _shutdown) = start_proxy(proxy_config(100), upstream).await;
    let client = reqwest::Client::new();

    let response = client.post(format!("{base}/api/comments")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .post(format!("{base}/api/comments"))
        .header("origin", base.as_str())
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["method"], "POST");
}

#[tokio::test]
async fn test_rate_limit_over_the_wire() {
    let upstream = common::start_echo_upstream().await;
    let (base, _shutdown) = start_proxy(proxy_config(2), upstream).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response = client
            .get(format!("{base}/posts"))
            .header("x-forwarded-for", "203.0.113.9")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = client
        .get(format!("{base}/posts"))
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0);
}

#[tokio::test]
async fn test_upstream_down_is_bad_gateway() {
    let upstream = common::unused_addr().await;
    let (base, _shutdown) = start_proxy(proxy_config(100), upstream).await;

    let response = reqwest::get(format!("{base}/posts")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn test_no_route_is_not_found() {
    let upstream = common::start_echo_upstream().await;
    let mut config = proxy_config(100);
    config.routes.retain(|r| r.name != "public");
    let (base, _shutdown) = start_proxy(config, upstream).await;

    let response = reqwest::get(format!("{base}/posts")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_graceful_shutdown() {
    let upstream = common::start_echo_upstream().await;
    let (base, shutdown) = start_proxy(proxy_config(100), upstream).await;

    let response = reqwest::get(format!("{base}/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap();
    assert!(client.get(format!("{base}/healthz")).send().await.is_err());
}
