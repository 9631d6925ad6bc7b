//! Gateway error taxonomy.
//!
//! Every variant maps to exactly one HTTP response (see `http::response`).
//! Policy denials are not represented here: the data access wrapper absorbs
//! them before they can reach the HTTP layer.

use thiserror::Error;

use crate::data::ErrorEnvelope;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded {
        limit: u32,
        reset_at_secs: u64,
        retry_after_secs: u64,
    },

    /// `reason` is only exposed to the client when `expose_reason` is set.
    #[error("CSRF validation failed: {reason}")]
    CsrfViolation { reason: String, expose_reason: bool },

    #[error("authentication required")]
    Unauthenticated,

    #[error("admin access required, role is {role}")]
    RoleInsufficient { role: String },

    #[error("profile lookup failed: {0}")]
    ProfileFetchFailed(String),

    #[error("data operation failed: {0}")]
    GenericFailure(ErrorEnvelope),
}

impl GatewayError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            GatewayError::CsrfViolation { .. } => "csrf_violation",
            GatewayError::Unauthenticated => "unauthenticated",
            GatewayError::RoleInsufficient { .. } => "role_insufficient",
            GatewayError::ProfileFetchFailed(_) => "profile_fetch_failed",
            GatewayError::GenericFailure(_) => "generic_failure",
        }
    }
}
