//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the request gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Deployment environment. Controls how much detail error bodies carry.
    pub environment: Environment,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Fixed-window rate limiting.
    pub rate_limit: RateLimitConfig,

    /// CSRF origin checks for mutating API calls.
    pub csrf: CsrfConfig,

    /// External identity service (sessions and profiles).
    pub identity: IdentityConfig,

    /// Policy-denial classification for the data access wrapper.
    pub data_access: DataAccessConfig,

    /// Upstream application server (binary mode).
    pub upstream: UpstreamConfig,

    /// Route definitions mapping request paths to access levels.
    pub routes: Vec<RouteConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            connect_secs: 5,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Default window length in seconds.
    pub window_secs: u64,

    /// Default maximum requests per window for one (identity, route) key.
    pub max_requests: u32,

    /// Paths (prefix match) that are never throttled.
    pub exempt_paths: Vec<String>,

    /// Per route-class overrides. Longest matching prefix wins.
    pub rules: Vec<RateLimitRule>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            max_requests: 60,
            exempt_paths: vec!["/healthz".to_string()],
            rules: Vec::new(),
        }
    }
}

/// Rate limit override for a class of routes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitRule {
    /// Rule identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match.
    pub path_prefix: String,

    /// Methods the rule applies to. Empty means every method.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Maximum requests per window.
    pub max_requests: u32,

    /// Window length in seconds. Falls back to the default window.
    #[serde(default)]
    pub window_secs: Option<u64>,
}

/// CSRF configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Enable CSRF validation.
    pub enabled: bool,

    /// Only paths under this prefix are checked.
    pub api_prefix: String,

    /// Origins accepted in addition to the request's own host.
    pub allowed_origins: Vec<String>,

    /// Paths (prefix match) that bypass the check, e.g. provider callbacks.
    pub excluded_paths: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_prefix: "/api".to_string(),
            allowed_origins: Vec::new(),
            excluded_paths: vec![
                "/api/auth/callback".to_string(),
                "/api/webhooks".to_string(),
            ],
        }
    }
}

/// External identity service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Endpoint resolving a bearer token to a session.
    pub session_url: String,

    /// PostgREST-style endpoint for profile rows.
    pub profiles_url: String,

    /// Service API key sent as the `apikey` header.
    pub api_key: String,

    /// Cookie carrying the session token when no bearer token is sent.
    pub session_cookie: String,

    /// Upper bound for a single session or profile lookup in milliseconds.
    pub lookup_timeout_ms: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            session_url: "http://127.0.0.1:9999/auth/v1/session".to_string(),
            profiles_url: "http://127.0.0.1:9999/rest/v1/profiles".to_string(),
            api_key: String::new(),
            session_cookie: "session".to_string(),
            lookup_timeout_ms: 3000,
        }
    }
}

/// Data access classification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataAccessConfig {
    /// Error codes the data service uses for row-level policy denials.
    pub denial_codes: Vec<String>,

    /// Message fragments (case-insensitive) identifying policy denials.
    pub denial_messages: Vec<String>,
}

impl Default for DataAccessConfig {
    fn default() -> Self {
        Self {
            denial_codes: vec![
                "42501".to_string(),
                "PGRST301".to_string(),
                "PGRST302".to_string(),
            ],
            denial_messages: vec![
                "row-level security".to_string(),
                "permission denied".to_string(),
                "insufficient privilege".to_string(),
                "not authorized".to_string(),
            ],
        }
    }
}

/// Upstream application server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Who may reach a route.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    Public,
    Authenticated,
    Admin,
}

/// Route configuration mapping requests to an access level.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact match).
    #[serde(default)]
    pub host: Option<String>,

    /// Path prefix to match.
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Required access level.
    #[serde(default)]
    pub access: AccessLevel,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.rate_limit.max_requests, 60);
        assert_eq!(config.csrf.api_prefix, "/api");
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let raw = r#"
            environment = "production"

            [rate_limit]
            window_secs = 30
            max_requests = 10

            [[rate_limit.rules]]
            name = "admin"
            path_prefix = "/api/admin"
            max_requests = 5

            [csrf]
            allowed_origins = ["https://app.example.com"]

            [[routes]]
            name = "admin-api"
            path_prefix = "/api/admin"
            access = "admin"
            priority = 10
        "#;
        let config: GatewayConfig = toml::from_str(raw).unwrap();
        assert!(config.environment.is_production());
        assert_eq!(config.rate_limit.rules[0].max_requests, 5);
        assert!(config.rate_limit.rules[0].methods.is_empty());
        assert_eq!(config.routes[0].access, AccessLevel::Admin);
        // Untouched sections keep their defaults.
        assert_eq!(config.csrf.excluded_paths.len(), 2);
    }
}
