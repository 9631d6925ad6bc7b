//! Origin-based CSRF validation for mutating API requests.
//!
//! # Design Decisions
//! - Only non-safe methods under the API prefix are checked
//! - A request with neither Origin nor Referer is rejected
//! - Origin wins over Referer when both are present
//! - The rejection reason is logged; clients only see it outside production

use axum::http::{header, Method};
use axum::response::IntoResponse;
use url::Url;

use crate::config::CsrfConfig;
use crate::error::GatewayError;
use crate::http::pipeline::{RequestContext, Stage, StageOutcome};
use crate::observability::metrics;
use crate::routing::matcher::path_has_prefix;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrfVerdict {
    /// Origin checked and accepted.
    Valid,
    /// Check not applicable (safe method, non-API path, excluded path).
    Skipped,
    /// Rejected; the reason is for server-side logs.
    Invalid(String),
}

impl CsrfVerdict {
    pub fn is_invalid(&self) -> bool {
        matches!(self, CsrfVerdict::Invalid(_))
    }
}

#[derive(Debug, Clone)]
pub struct CsrfValidator {
    api_prefix: String,
    excluded_paths: Vec<String>,
    /// Lowercased `host[:port]` authorities.
    allowed_hosts: Vec<String>,
}

impl CsrfValidator {
    pub fn from_config(config: &CsrfConfig) -> Self {
        let allowed_hosts = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match Url::parse(origin) {
                Ok(url) => url_authority(&url),
                Err(e) => {
                    tracing::warn!(origin = %origin, error = %e, "Ignoring unparseable allowed origin");
                    None
                }
            })
            .collect();

        Self {
            api_prefix: config.api_prefix.clone(),
            excluded_paths: config.excluded_paths.clone(),
            allowed_hosts,
        }
    }

    /// Whether a request with this method and path is subject to the check.
    pub fn applies_to(&self, method: &Method, path: &str) -> bool {
        !method.is_safe()
            && path_has_prefix(path, &self.api_prefix)
            && !self.excluded_paths.iter().any(|p| path_has_prefix(path, p))
    }

    pub fn validate(
        &self,
        method: &Method,
        origin: Option<&str>,
        referer: Option<&str>,
        host: Option<&str>,
        path: &str,
    ) -> CsrfVerdict {
        if !self.applies_to(method, path) {
            return CsrfVerdict::Skipped;
        }

        let (source, value) = match (origin, referer) {
            (Some(origin), _) => ("origin", origin),
            (None, Some(referer)) => ("referer", referer),
            (None, None) => return CsrfVerdict::Invalid("missing origin and referer".to_string()),
        };

        let authority = match Url::parse(value).ok().as_ref().and_then(url_authority) {
            Some(authority) => authority,
            None => return CsrfVerdict::Invalid(format!("malformed {source} header: {value}")),
        };

        let own_host = host.map(normalize_host);
        if own_host.as_deref() == Some(authority.as_str()) || self.allowed_hosts.contains(&authority) {
            CsrfVerdict::Valid
        } else {
            CsrfVerdict::Invalid(format!("{source} host {authority} is not allowed"))
        }
    }
}

/// `host[:port]` of a URL, lowercased, with ports 80 and 443 dropped.
fn url_authority(url: &Url) -> Option<String> {
    Some(authority(&url.host_str()?.to_lowercase(), url.port()))
}

/// `Host` header value normalized like [`url_authority`].
fn normalize_host(host: &str) -> String {
    let host = host.trim().to_lowercase();
    match host.rsplit_once(':') {
        Some((name, port)) => match port.parse::<u16>() {
            Ok(port) => authority(name, Some(port)),
            Err(_) => host,
        },
        None => host,
    }
}

fn authority(host: &str, port: Option<u16>) -> String {
    match port {
        None | Some(80) | Some(443) => host.to_string(),
        Some(port) => format!("{host}:{port}"),
    }
}

/// Pipeline stage enforcing [`CsrfValidator`].
#[derive(Debug, Clone)]
pub struct CsrfStage {
    validator: CsrfValidator,
    expose_reason: bool,
}

impl CsrfStage {
    /// `expose_reason` adds the rejection reason to response bodies.
    pub fn new(validator: CsrfValidator, expose_reason: bool) -> Self {
        Self {
            validator,
            expose_reason,
        }
    }
}

impl Stage for CsrfStage {
    fn name(&self) -> &'static str {
        "csrf"
    }

    fn evaluate(&self, ctx: &RequestContext<'_>) -> StageOutcome {
        let get = |name: header::HeaderName| ctx.headers.get(name).and_then(|v| v.to_str().ok());

        match self.validator.validate(
            ctx.method,
            get(header::ORIGIN),
            get(header::REFERER),
            get(header::HOST),
            ctx.path,
        ) {
            CsrfVerdict::Valid | CsrfVerdict::Skipped => StageOutcome::proceed(),
            CsrfVerdict::Invalid(reason) => {
                tracing::warn!(
                    method = %ctx.method,
                    path = %ctx.path,
                    identity = %ctx.identity,
                    reason = %reason,
                    "CSRF violation"
                );
                metrics::record_csrf_rejected();
                StageOutcome::Respond(
                    GatewayError::CsrfViolation {
                        reason,
                        expose_reason: self.expose_reason,
                    }
                    .into_response(),
                )
            }
        }
    }
}
