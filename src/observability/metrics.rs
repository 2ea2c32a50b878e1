//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define dispatch metrics (requests, latency, routing, connections)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): answered requests by method, status
//! - `dispatch_request_duration_seconds` (histogram): begin-to-answer latency
//! - `dispatch_routing_total` (counter): resolutions by kind (static, pattern, miss)
//! - `dispatch_form_faults_total` (counter): form bodies the parser gave up on
//! - `dispatch_active_connections` (gauge): current transport connection count

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the global recorder and start the scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &'static str, status: u16, start: Instant) {
    let status = status.to_string();
    metrics::counter!(
        "dispatch_requests_total",
        "method" => method,
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        "dispatch_request_duration_seconds",
        "method" => method,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_routing(kind: &'static str) {
    metrics::counter!("dispatch_routing_total", "kind" => kind).increment(1);
}

pub fn record_parse_fault() {
    metrics::counter!("dispatch_form_faults_total").increment(1);
}

pub fn record_active_connections(active: u64) {
    metrics::gauge!("dispatch_active_connections").set(active as f64);
}
