//! Escalating authentication and admin checks.
//!
//! `require_auth` resolves the session; `require_admin` additionally fetches
//! the role from the profile store. A failed profile lookup and a non-admin
//! role are kept apart: the first is an infrastructure problem (500), the
//! second a legitimate denial (403).

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tokio::time::timeout;

use crate::auth::session::{
    AuthenticatedUser, Credentials, ProfileStore, Role, SessionResolver,
};
use crate::config::IdentityConfig;
use crate::error::GatewayError;
use crate::observability::metrics;

#[derive(Clone)]
pub struct AuthGate {
    sessions: Arc<dyn SessionResolver>,
    profiles: Arc<dyn ProfileStore>,
    lookup_timeout: Duration,
    cookie_name: String,
}

impl AuthGate {
    pub fn new(
        sessions: Arc<dyn SessionResolver>,
        profiles: Arc<dyn ProfileStore>,
        config: &IdentityConfig,
    ) -> Self {
        Self {
            sessions,
            profiles,
            lookup_timeout: Duration::from_millis(config.lookup_timeout_ms),
            cookie_name: config.session_cookie.clone(),
        }
    }

    pub fn credentials(&self, headers: &HeaderMap) -> Option<Credentials> {
        Credentials::from_headers(headers, &self.cookie_name)
    }

    /// Resolve the session. Missing, expired or unresolvable sessions are
    /// all `Unauthenticated`.
    pub async fn require_auth(&self, credentials: Option<&Credentials>) -> Result<AuthenticatedUser, GatewayError> {
        let Some(credentials) = credentials else {
            tracing::debug!("No credentials presented");
            return Err(unauthenticated());
        };

        let session = match timeout(self.lookup_timeout, self.sessions.resolve(credentials)).await {
            Ok(Ok(Some(session))) => session,
            Ok(Ok(None)) => {
                tracing::debug!("No session for presented credentials");
                return Err(unauthenticated());
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Session lookup failed");
                return Err(unauthenticated());
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.lookup_timeout.as_millis() as u64, "Session lookup timed out");
                return Err(unauthenticated());
            }
        };

        if !session.is_active() {
            tracing::debug!(user_id = %session.user_id, "Session expired");
            return Err(unauthenticated());
        }

        Ok(AuthenticatedUser {
            user_id: session.user_id,
            role: None,
        })
    }

    /// Session check followed by a fresh role lookup.
    pub async fn require_admin(&self, credentials: Option<&Credentials>) -> Result<AuthenticatedUser, GatewayError> {
        let user = self.require_auth(credentials).await?;
        self.escalate_to_admin(user).await
    }

    /// Role step only, for a user whose session was already resolved.
    pub async fn escalate_to_admin(&self, user: AuthenticatedUser) -> Result<AuthenticatedUser, GatewayError> {
        let profile = match timeout(self.lookup_timeout, self.profiles.fetch_profile(&user.user_id)).await {
            Ok(Ok(profile)) => profile,
            Ok(Err(e)) => {
                tracing::error!(user_id = %user.user_id, error = %e, "Profile lookup failed");
                metrics::record_auth_failure("profile_fetch_failed");
                return Err(GatewayError::ProfileFetchFailed(e.to_string()));
            }
            Err(_) => {
                tracing::error!(user_id = %user.user_id, "Profile lookup timed out");
                metrics::record_auth_failure("profile_fetch_failed");
                return Err(GatewayError::ProfileFetchFailed("profile lookup timed out".to_string()));
            }
        };

        match Role::parse(&profile.role) {
            Some(Role::Admin) => Ok(AuthenticatedUser {
                role: Some(Role::Admin),
                ..user
            }),
            _ => {
                tracing::warn!(user_id = %user.user_id, role = %profile.role, "Admin access denied");
                metrics::record_auth_failure("role_insufficient");
                Err(GatewayError::RoleInsufficient { role: profile.role })
            }
        }
    }
}

fn unauthenticated() -> GatewayError {
    metrics::record_auth_failure("unauthenticated");
    GatewayError::Unauthenticated
}
