//! Mapping of gateway errors to HTTP responses.
//!
//! Authorization and data failures stay deliberately vague; only rate limit
//! and validation errors say what the client can do about them.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::GatewayError;
use crate::security::rate_limit::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        tracing::debug!(kind = self.kind(), "Responding with gateway error");
        match self {
            GatewayError::RateLimitExceeded {
                limit,
                reset_at_secs,
                retry_after_secs,
            } => {
                let body = json!({
                    "error": format!("Too many requests. Try again in {retry_after_secs} seconds."),
                });
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                let headers = response.headers_mut();
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
                headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from_static("0"));
                headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_at_secs));
                response
            }
            GatewayError::CsrfViolation { reason, expose_reason } => {
                let body = if expose_reason {
                    json!({ "error": "CSRF validation failed", "message": reason })
                } else {
                    json!({ "error": "CSRF validation failed" })
                };
                (StatusCode::FORBIDDEN, Json(body)).into_response()
            }
            GatewayError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Authentication required" })),
            )
                .into_response(),
            GatewayError::RoleInsufficient { role } => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Admin access required", "role": role })),
            )
                .into_response(),
            GatewayError::ProfileFetchFailed(_) | GatewayError::GenericFailure(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": INTERNAL_ERROR_MESSAGE })),
            )
                .into_response(),
        }
    }
}
