//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method and status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): rejections by rule
//! - `gateway_csrf_rejected_total` (counter): CSRF rejections
//! - `gateway_auth_failures_total` (counter): auth gate failures by kind
//! - `gateway_policy_denials_total` (counter): absorbed denials by context
//! - `gateway_data_failures_total` (counter): generic data failures by context
//! - `gateway_rate_limit_entries` (gauge): live counter table size
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(rule: &str) {
    counter!("gateway_rate_limited_total", "rule" => rule.to_string()).increment(1);
}

pub fn record_rate_limit_entries(entries: usize) {
    gauge!("gateway_rate_limit_entries").set(entries as f64);
}

pub fn record_csrf_rejected() {
    counter!("gateway_csrf_rejected_total").increment(1);
}

pub fn record_auth_failure(kind: &'static str) {
    counter!("gateway_auth_failures_total", "kind" => kind).increment(1);
}

pub fn record_policy_denial(context: &str) {
    counter!("gateway_policy_denials_total", "context" => context.to_string()).increment(1);
}

pub fn record_data_failure(context: &str) {
    counter!("gateway_data_failures_total", "context" => context.to_string()).increment(1);
}
