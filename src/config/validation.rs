//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, limits > 0, timeouts > 0)
//! - Check that addresses and allow-listed origins parse
//! - Detect duplicate route and rule names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: String },

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: String, value: String },

    #[error("allowed origin is not a valid URL: {0}")]
    InvalidOrigin(String),

    #[error("rate limit rule {rule} has invalid method {method}")]
    InvalidMethod { rule: String, method: String },

    #[error("duplicate {kind} name: {name}")]
    Duplicate { kind: &'static str, name: String },

    #[error("{field} must start with '/': {value}")]
    InvalidPath { field: String, value: String },
}

fn not_positive(field: impl Into<String>) -> ValidationError {
    ValidationError::NotPositive { field: field.into() }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "upstream.address", &config.upstream.address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.timeouts.request_secs == 0 {
        errors.push(not_positive("timeouts.request_secs"));
    }
    if config.identity.lookup_timeout_ms == 0 {
        errors.push(not_positive("identity.lookup_timeout_ms"));
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.window_secs == 0 {
        errors.push(not_positive("rate_limit.window_secs"));
    }
    if rate_limit.max_requests == 0 {
        errors.push(not_positive("rate_limit.max_requests"));
    }

    let mut rule_names = HashSet::new();
    for rule in &rate_limit.rules {
        if !rule_names.insert(rule.name.as_str()) {
            errors.push(ValidationError::Duplicate {
                kind: "rate limit rule",
                name: rule.name.clone(),
            });
        }
        if rule.max_requests == 0 {
            errors.push(not_positive(format!("rate_limit.rules.{}.max_requests", rule.name)));
        }
        if rule.window_secs == Some(0) {
            errors.push(not_positive(format!("rate_limit.rules.{}.window_secs", rule.name)));
        }
        check_path(&mut errors, "rate_limit.rules.path_prefix", &rule.path_prefix);
        for method in &rule.methods {
            if method.parse::<Method>().is_err() {
                errors.push(ValidationError::InvalidMethod {
                    rule: rule.name.clone(),
                    method: method.clone(),
                });
            }
        }
    }

    check_path(&mut errors, "csrf.api_prefix", &config.csrf.api_prefix);
    for path in &config.csrf.excluded_paths {
        check_path(&mut errors, "csrf.excluded_paths", path);
    }
    for origin in &config.csrf.allowed_origins {
        let valid = Url::parse(origin)
            .map(|u| u.host_str().is_some())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidOrigin(origin.clone()));
        }
    }

    let mut route_names = HashSet::new();
    for route in &config.routes {
        if !route_names.insert(route.name.as_str()) {
            errors.push(ValidationError::Duplicate {
                kind: "route",
                name: route.name.clone(),
            });
        }
        if let Some(prefix) = &route.path_prefix {
            check_path(&mut errors, "routes.path_prefix", prefix);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

fn check_path(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if !value.starts_with('/') {
        errors.push(ValidationError::InvalidPath {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RateLimitRule, RouteConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.csrf.allowed_origins.push("app.example.com".into());
        config.rate_limit.rules.push(RateLimitRule {
            name: "writes".into(),
            path_prefix: "api".into(),
            methods: vec!["P OST".into()],
            max_requests: 0,
            window_secs: None,
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::InvalidOrigin("app.example.com".into())));
    }

    #[test]
    fn test_duplicate_route_names() {
        let mut config = GatewayConfig::default();
        for _ in 0..2 {
            config.routes.push(RouteConfig {
                name: "api".into(),
                host: None,
                path_prefix: Some("/api".into()),
                access: Default::default(),
                priority: 0,
            });
        }

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::Duplicate { kind: "route", name: "api".into() }]
        );
    }
}
