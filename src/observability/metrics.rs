//! Metrics collection and exposition.
//!
//! # Metrics
//! - `portmux_requests_total` (counter): requests by port, group, status
//! - `portmux_request_duration_seconds` (histogram): time to upstream response headers
//! - `portmux_health_checks_total` (counter): probes by result
//! - `portmux_listeners` (gauge): live port listeners
//!
//! # Design Decisions
//! - `metrics` facade only; without an installed recorder every call is a no-op
//! - Prometheus exporter is optional and bound to its own address

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one proxied request. `group` is "none" when routing failed.
pub fn record_request(port: u16, group: &str, status: u16, start: Instant) {
    let labels = [
        ("port", port.to_string()),
        ("group", group.to_string()),
        ("status", status.to_string()),
    ];
    counter!("portmux_requests_total", &labels).increment(1);
    histogram!("portmux_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_health_check(healthy: bool) {
    let result = if healthy { "healthy" } else { "unhealthy" };
    counter!("portmux_health_checks_total", "result" => result).increment(1);
}

pub fn set_live_listeners(count: usize) {
    gauge!("portmux_listeners").set(count as f64);
}
