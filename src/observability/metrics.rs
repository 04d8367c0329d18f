//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_requests_total` (counter): inbound requests by method, status
//! - `router_request_duration_seconds` (histogram): end-to-end latency
//! - `router_attempts_total` (counter): backend attempts by backend, outcome
//! - `router_backend_load` (gauge): current load signal per backend
//! - `router_backend_state` (gauge): 0=healthy, 1=degraded, 2=unavailable
//! - `router_circuit_transitions_total` (counter): state changes by backend, target
//!
//! Without an installed recorder every call here is a no-op, so library
//! users and tests pay nothing.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::load_balancer::HealthState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished inbound request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "router_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("router_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record one backend attempt and how it ended.
pub fn record_attempt(backend: &str, outcome: &'static str, latency: Duration) {
    counter!(
        "router_attempts_total",
        "backend" => backend.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("router_attempt_duration_seconds", "backend" => backend.to_string())
        .record(latency.as_secs_f64());
}

/// Publish the latest load value of a backend.
pub fn record_backend_load(backend: &str, load: f64) {
    gauge!("router_backend_load", "backend" => backend.to_string()).set(load);
}

/// Count a circuit transition and publish the new state.
pub fn record_circuit_transition(backend: &str, to: HealthState) {
    counter!(
        "router_circuit_transitions_total",
        "backend" => backend.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
    gauge!("router_backend_state", "backend" => backend.to_string()).set(to as u8 as f64);
}
