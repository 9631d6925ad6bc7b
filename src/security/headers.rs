//! Security response headers.
//!
//! # Responsibilities
//! - Attach a fixed set of defensive headers to every response
//!
//! # Design Decisions
//! - Runs as the outermost gateway layer so rejections carry the headers too
//! - Overwrites values set by handlers or the upstream

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;

pub const SECURITY_HEADERS: [(HeaderName, &str); 5] = [
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (
        HeaderName::from_static("permissions-policy"),
        "camera=(), microphone=(), geolocation=()",
    ),
    (header::STRICT_TRANSPORT_SECURITY, "max-age=31536000; includeSubDomains"),
];

/// Insert the security header set into `headers`.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

/// `map_response` hook for the router.
pub async fn security_headers(mut response: Response) -> Response {
    apply_security_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_headers_applied_and_overwritten() {
        let mut headers = HeaderMap::new();
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("ALLOWALL"));

        apply_security_headers(&mut headers);

        assert_eq!(headers.len(), 5);
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers["permissions-policy"], "camera=(), microphone=(), geolocation=()");
        assert!(headers[header::STRICT_TRANSPORT_SECURITY]
            .to_str()
            .unwrap()
            .starts_with("max-age="));
    }
}
