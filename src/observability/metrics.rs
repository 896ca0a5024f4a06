//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mirror_requests_total` (counter): inbound requests by method, status
//! - `mirror_request_duration_seconds` (histogram): inbound latency
//! - `mirror_cache_lookups_total` (counter): lookups by result (hit, miss)
//! - `mirror_cache_writes_total` (counter): writes by result (ok, error)
//! - `mirror_upstream_requests_total` (counter): origin responses by status
//! - `mirror_upstream_duration_seconds` (histogram): origin latency
//! - `mirror_upstream_errors_total` (counter): transport failures by kind
//!
//! Recording is always on; without an installed exporter the macros are no-ops.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "mirror_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("mirror_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("mirror_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_write(ok: bool) {
    let result = if ok { "ok" } else { "error" };
    counter!("mirror_cache_writes_total", "result" => result).increment(1);
}

pub fn record_upstream_response(status: u16, start: Instant) {
    counter!("mirror_upstream_requests_total", "status" => status.to_string()).increment(1);
    histogram!("mirror_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("mirror_upstream_errors_total", "kind" => kind).increment(1);
}
