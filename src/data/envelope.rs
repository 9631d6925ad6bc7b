//! Normalized data service errors and their classification.
//!
//! The data service reports failures in whatever shape its client library
//! produces. Adapters at the boundary convert them into an [`ErrorEnvelope`]
//! so classification never inspects the store's native error types.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::DataAccessConfig;

/// Error reported by the data service, reduced to code and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(str::to_string),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    /// Envelope for an error that carries no code.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ErrorEnvelope {}

impl From<serde_json::Value> for ErrorEnvelope {
    /// Lenient conversion from an arbitrary JSON error body.
    fn from(value: serde_json::Value) -> Self {
        let text = |key: &str| match value.get(key) {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self {
            code: text("code"),
            message: text("message")
                .or_else(|| text("error"))
                .unwrap_or_else(|| value.to_string()),
            details: text("details"),
            hint: text("hint"),
        }
    }
}

impl From<reqwest::Error> for ErrorEnvelope {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() { Some("timeout") } else { None };
        Self::new(code, err.to_string())
    }
}

/// Outcome of classifying a data service error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Row-level policy said no. Must look like "no data" to the client.
    PolicyDenial,
    /// Anything else: infrastructure failure, constraint violation, timeout.
    GenericFailure,
}

/// Maps error envelopes to [`ErrorClassification`].
///
/// Classification is a pure function of the envelope and the configured
/// code and message sets.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    denial_codes: HashSet<String>,
    denial_messages: Vec<String>,
}

impl ErrorClassifier {
    pub fn new<C, M>(codes: C, messages: M) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            denial_codes: codes.into_iter().map(Into::into).collect(),
            denial_messages: messages
                .into_iter()
                .map(|m| m.into().to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &DataAccessConfig) -> Self {
        Self::new(
            config.denial_codes.iter().cloned(),
            config.denial_messages.iter().cloned(),
        )
    }

    pub fn classify(&self, error: &ErrorEnvelope) -> ErrorClassification {
        if let Some(code) = &error.code {
            if self.denial_codes.contains(code) {
                return ErrorClassification::PolicyDenial;
            }
        }

        let message = error.message.to_lowercase();
        if self.denial_messages.iter().any(|m| message.contains(m)) {
            return ErrorClassification::PolicyDenial;
        }

        ErrorClassification::GenericFailure
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::from_config(&DataAccessConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_denial_by_code() {
        let classifier = ErrorClassifier::default();
        let err = ErrorEnvelope::new(Some("42501"), "whatever");
        assert_eq!(classifier.classify(&err), ErrorClassification::PolicyDenial);
    }

    #[test]
    fn test_denial_by_message_is_case_insensitive() {
        let classifier = ErrorClassifier::default();
        let err = ErrorEnvelope::message(
            "New row violates Row-Level Security policy for table \"posts\"",
        );
        assert_eq!(classifier.classify(&err), ErrorClassification::PolicyDenial);
    }

    #[test]
    fn test_generic_failures() {
        let classifier = ErrorClassifier::default();
        let timeout = ErrorEnvelope::new(Some("57014"), "canceling statement due to statement timeout");
        let unique = ErrorEnvelope::new(Some("23505"), "duplicate key value violates unique constraint");
        assert_eq!(classifier.classify(&timeout), ErrorClassification::GenericFailure);
        assert_eq!(classifier.classify(&unique), ErrorClassification::GenericFailure);
    }

    #[test]
    fn test_custom_sets() {
        let classifier = ErrorClassifier::new(["X1"], ["forbidden"]);
        assert_eq!(
            classifier.classify(&ErrorEnvelope::new(Some("42501"), "nope")),
            ErrorClassification::GenericFailure
        );
        assert_eq!(
            classifier.classify(&ErrorEnvelope::message("FORBIDDEN by rule")),
            ErrorClassification::PolicyDenial
        );
    }

    #[test]
    fn test_envelope_from_json_body() {
        let env = ErrorEnvelope::from(json!({
            "code": "42501",
            "message": "permission denied for table profiles",
            "details": null,
            "hint": null
        }));
        assert_eq!(env.code.as_deref(), Some("42501"));
        assert_eq!(env.message, "permission denied for table profiles");
        assert_eq!(env.details, None);

        let bare = ErrorEnvelope::from(json!({ "error": "boom" }));
        assert_eq!(bare.code, None);
        assert_eq!(bare.message, "boom");
    }
}
