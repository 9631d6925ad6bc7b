//! Client identity resolution.
//!
//! The identity is a throttling and logging key only. It comes from
//! client-controlled headers and must never feed an authorization decision.

use std::fmt;

use axum::http::HeaderMap;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Best-effort, unauthenticated request origin key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Resolve from request headers: first forwarded address, then real IP.
    pub fn resolve(headers: &HeaderMap) -> Self {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let real_ip = || {
            headers
                .get(X_REAL_IP)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let value = forwarded.or_else(real_ip).unwrap_or(UNKNOWN_CLIENT);
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
