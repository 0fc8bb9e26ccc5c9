//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by mapping, method, status
//! - `gateway_request_duration_seconds` (histogram): latency per mapping
//! - `gateway_denials_total` (counter): denied requests by mapping and flow
//! - `gateway_identity_calls_total` (counter): identity provider calls by flow and outcome
//! - `gateway_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_sessions_active` (gauge): sessions held in memory
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The Prometheus exporter serves its own HTTP listener

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_metrics();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

fn describe_metrics() {
    describe_counter!("gateway_requests_total", "Requests handled by the gateway");
    describe_histogram!(
        "gateway_request_duration_seconds",
        "End-to-end request latency in seconds"
    );
    describe_counter!("gateway_denials_total", "Requests denied by a mapping");
    describe_counter!("gateway_identity_calls_total", "Out-of-band identity provider calls");
    describe_gauge!("gateway_circuit_state", "Circuit breaker state per mapping");
    describe_gauge!("gateway_sessions_active", "Sessions held in memory");
}

/// Record a completed request.
pub fn record_request(mapping: &str, method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "mapping" => mapping.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "mapping" => mapping.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_denial(mapping: &str, flow: &'static str) {
    counter!("gateway_denials_total", "mapping" => mapping.to_string(), "flow" => flow).increment(1);
}

pub fn record_identity_call(flow: &'static str, outcome: &'static str) {
    counter!("gateway_identity_calls_total", "flow" => flow, "outcome" => outcome).increment(1);
}

pub fn record_circuit_state(mapping: &str, state: u8) {
    gauge!("gateway_circuit_state", "mapping" => mapping.to_string()).set(state as f64);
}

pub fn record_sessions_active(count: usize) {
    gauge!("gateway_sessions_active").set(count as f64);
}
