//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Build the identity service adapters and the auth gate
//! - Compose the gateway around the upstream-forwarding application
//!
//! Any startup error is fatal; listeners are bound only after the router
//! is fully built.

use std::net::{AddrParseError, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;

use crate::auth::{AuthGate, HttpProfileStore, HttpSessionResolver};
use crate::config::validation::validate_config;
use crate::config::{load_config, ConfigError, GatewayConfig};
use crate::http::Gateway;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid {field} address: {source}")]
    Address {
        field: &'static str,
        source: AddrParseError,
    },

    #[error("identity client error: {0}")]
    IdentityClient(#[from] reqwest::Error),

    #[error("upstream error: {0}")]
    Upstream(#[from] axum::http::Error),
}

/// Load configuration from `path`, or validated defaults when absent.
pub fn resolve_config(path: Option<&Path>) -> Result<GatewayConfig, StartupError> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => {
            let config = GatewayConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

pub fn parse_address(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value
        .parse()
        .map_err(|source| StartupError::Address { field, source })
}

/// Build the complete gateway application for the binary.
pub fn build_app(config: GatewayConfig) -> Result<Router, StartupError> {
    let upstream = parse_address("upstream", &config.upstream.address)?;

    let sessions = Arc::new(HttpSessionResolver::new(&config.identity)?);
    let profiles = Arc::new(HttpProfileStore::new(&config.identity)?);
    let gate = AuthGate::new(sessions, profiles, &config.identity);

    tracing::info!(
        upstream = %upstream,
        routes = config.routes.len(),
        rate_limit_rules = config.rate_limit.rules.len(),
        "Building gateway"
    );

    let gateway = Gateway::new(config, gate);
    let app = gateway.upstream_app(upstream)?;
    Ok(gateway.wrap(app))
}
