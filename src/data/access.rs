//! Permission-aware execution of data service operations.
//!
//! Every store call made by a business handler goes through
//! [`DataAccess::execute`]. Policy denials are swapped for the fallback the
//! call site asked for, so a caller that may not see a row gets the same
//! answer as a caller asking for a row that does not exist.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::data::envelope::{ErrorClassification, ErrorClassifier, ErrorEnvelope};
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::security::ClientIdentity;

/// Paginated collection returned by list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

pub const DEFAULT_PAGE_LIMIT: u32 = 20;

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, page: u32, limit: u32) -> Self {
        let limit = limit.max(1);
        Self {
            data,
            pagination: Pagination {
                total,
                page,
                limit,
                total_pages: total.div_ceil(u64::from(limit)),
            },
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::new(Vec::new(), 0, 1, DEFAULT_PAGE_LIMIT)
    }
}

/// Which fallback shape a call site selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    /// Empty collection (`T::default()`).
    EmptyList,
    /// Resource reported as missing (404).
    NotFound,
    /// Caller-supplied literal.
    Value,
    /// Write operation silently skipped.
    NoOp,
}

enum Fallback<T> {
    EmptyList(T),
    NotFound,
    Value(T),
    NoOp,
}

impl<T> Fallback<T> {
    fn kind(&self) -> FallbackKind {
        match self {
            Fallback::EmptyList(_) => FallbackKind::EmptyList,
            Fallback::NotFound => FallbackKind::NotFound,
            Fallback::Value(_) => FallbackKind::Value,
            Fallback::NoOp => FallbackKind::NoOp,
        }
    }

    fn into_data(self) -> Option<T> {
        match self {
            Fallback::EmptyList(v) | Fallback::Value(v) => Some(v),
            Fallback::NotFound | Fallback::NoOp => None,
        }
    }
}

/// Per-call policy for [`DataAccess::execute`].
///
/// Defaults to the single-resource shape (404 on denial).
pub struct QueryOptions<T> {
    context: String,
    fallback: Fallback<T>,
}

impl<T> QueryOptions<T> {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            fallback: Fallback::NotFound,
        }
    }

    pub fn not_found(mut self) -> Self {
        self.fallback = Fallback::NotFound;
        self
    }

    pub fn fallback(mut self, value: T) -> Self {
        self.fallback = Fallback::Value(value);
        self
    }

    pub fn no_op(mut self) -> Self {
        self.fallback = Fallback::NoOp;
        self
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn fallback_kind(&self) -> FallbackKind {
        self.fallback.kind()
    }
}

impl<T: Default> QueryOptions<T> {
    pub fn empty_list(mut self) -> Self {
        self.fallback = Fallback::EmptyList(T::default());
        self
    }
}

/// Result of a wrapped data operation.
///
/// `error` is only ever set for generic failures; a policy denial leaves it
/// empty and reports through `is_policy_denial` instead.
#[derive(Debug)]
pub struct QueryOutcome<T> {
    pub data: Option<T>,
    pub error: Option<ErrorEnvelope>,
    pub is_policy_denial: bool,
    fallback: Option<FallbackKind>,
}

impl<T> QueryOutcome<T> {
    fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            is_policy_denial: false,
            fallback: None,
        }
    }

    /// The fallback shape that replaced the data, if one did.
    pub fn fallback_applied(&self) -> Option<FallbackKind> {
        self.fallback
    }

    pub fn is_not_found(&self) -> bool {
        self.fallback == Some(FallbackKind::NotFound)
    }

    /// Convert into a handler result. Generic failures become a 500.
    pub fn into_result(self) -> Result<Option<T>, GatewayError> {
        match self.error {
            Some(err) => Err(GatewayError::GenericFailure(err)),
            None => Ok(self.data),
        }
    }
}

impl<T: Serialize> IntoResponse for QueryOutcome<T> {
    fn into_response(self) -> Response {
        let fallback = self.fallback;
        match self.into_result() {
            Ok(Some(data)) => (StatusCode::OK, Json(data)).into_response(),
            Ok(None) if fallback == Some(FallbackKind::NoOp) => StatusCode::NO_CONTENT.into_response(),
            Ok(None) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "Not found" })),
            )
                .into_response(),
            Err(err) => err.into_response(),
        }
    }
}

/// Executes data operations with policy-denial absorption.
#[derive(Debug, Clone)]
pub struct DataAccess {
    classifier: Arc<ErrorClassifier>,
    actor: Option<String>,
}

impl DataAccess {
    pub fn new(classifier: Arc<ErrorClassifier>) -> Self {
        Self {
            classifier,
            actor: None,
        }
    }

    /// A copy that attributes log lines to `actor` (usually the user id).
    pub fn for_actor(&self, actor: impl Into<String>) -> Self {
        Self {
            classifier: self.classifier.clone(),
            actor: Some(actor.into()),
        }
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Identity that log lines are attributed to.
    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    /// Run `operation` once and classify any failure.
    ///
    /// Returned errors and panics are treated alike. Nothing is retried.
    pub async fn execute<T, E, F, Fut>(&self, operation: F, options: QueryOptions<T>) -> QueryOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<ErrorEnvelope>,
    {
        let result = match panic::catch_unwind(AssertUnwindSafe(operation)) {
            Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result.map_err(Into::into),
                Err(payload) => Err(panic_envelope(payload)),
            },
            Err(payload) => Err(panic_envelope(payload)),
        };

        let error = match result {
            Ok(data) => return QueryOutcome::success(data),
            Err(error) => error,
        };

        let actor = self.actor.as_deref().unwrap_or("anonymous");
        match self.classifier.classify(&error) {
            ErrorClassification::PolicyDenial => {
                tracing::info!(
                    context = %options.context,
                    actor = %actor,
                    code = ?error.code,
                    message = %error.message,
                    fallback = ?options.fallback.kind(),
                    "Policy denial absorbed"
                );
                metrics::record_policy_denial(&options.context);

                let kind = options.fallback.kind();
                QueryOutcome {
                    data: options.fallback.into_data(),
                    error: None,
                    is_policy_denial: true,
                    fallback: Some(kind),
                }
            }
            ErrorClassification::GenericFailure => {
                tracing::error!(
                    context = %options.context,
                    actor = %actor,
                    error = %error,
                    "Data operation failed"
                );
                metrics::record_data_failure(&options.context);

                QueryOutcome {
                    data: None,
                    error: Some(error),
                    is_policy_denial: false,
                    fallback: None,
                }
            }
        }
    }
}

impl Default for DataAccess {
    fn default() -> Self {
        Self::new(Arc::new(ErrorClassifier::default()))
    }
}

/// Extracts the gateway's [`DataAccess`] attributed to the caller.
///
/// The actor is the authenticated user when an auth layer ran, otherwise
/// the client identity resolved by the pipeline.
impl<S> FromRequestParts<S> for DataAccess
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(base) = parts.extensions.get::<DataAccess>() else {
            tracing::error!("DataAccess requested outside a gateway-wrapped router");
            return Err(GatewayError::GenericFailure(ErrorEnvelope::new(
                None,
                "data access is not configured",
            )));
        };

        let actor = parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|user| user.user_id.clone())
            .or_else(|| parts.extensions.get::<ClientIdentity>().map(ToString::to_string));

        Ok(match actor {
            Some(actor) => base.for_actor(actor),
            None => base.clone(),
        })
    }
}

fn panic_envelope(payload: Box<dyn Any + Send>) -> ErrorEnvelope {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    ErrorEnvelope::new(Some("panic"), format!("data operation panicked: {detail}"))
}
