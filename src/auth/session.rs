//! Session, profile and credential types plus the identity service ports.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

use crate::data::ErrorEnvelope;

/// Platform role stored on the profile row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Parse a stored role; unknown values are `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session owned by the identity service. Read-only for the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    /// Expiry in seconds since the epoch.
    pub expires_at: u64,
    /// Role claimed by the session. Never used for admin decisions.
    #[serde(default)]
    pub role: Option<Role>,
}

impl Session {
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        self.expires_at <= now_secs
    }

    /// Check if the session is still valid now.
    pub fn is_active(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        !self.is_expired_at(now)
    }
}

/// Profile row keyed by user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(alias = "id")]
    pub user_id: String,
    pub role: String,
}

/// Opaque token extracted from the request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    /// Bearer token first, then the named session cookie.
    pub fn from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<Self> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().split_once(' '))
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .map(|(_, token)| token.trim())
            .filter(|t| !t.is_empty());

        if let Some(token) = bearer {
            return Some(Self::new(token));
        }

        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == cookie_name && !value.is_empty())
            .map(|(_, value)| Self::new(value))
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

/// User resolved by the auth gate, attached to request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    /// Set once the role was fetched from the profile store.
    pub role: Option<Role>,
}

/// Failure talking to the identity service.
#[derive(Debug, thiserror::Error)]
pub enum IdentityServiceError {
    #[error("identity service request failed: {0}")]
    Transport(String),

    #[error("identity service returned status {0}")]
    Status(u16),

    #[error("identity service response was malformed: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for IdentityServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            IdentityServiceError::Decode(err.to_string())
        } else {
            IdentityServiceError::Transport(err.to_string())
        }
    }
}

/// Resolves credentials to a session. `Ok(None)` means "no session".
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, credentials: &Credentials) -> Result<Option<Session>, IdentityServiceError>;
}

/// Fetches the profile row holding a user's role.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_profile(&self, user_id: &str) -> Result<Profile, ErrorEnvelope>;
}
