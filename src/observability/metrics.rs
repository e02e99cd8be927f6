//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): requests by outcome
//! - `bridge_request_duration_seconds` (histogram): time spent in the bridge
//! - `bridge_host_ready` (gauge): 1=host accepting work, 0=not
//! - `bridge_late_replies_total` (counter): host replies nobody was waiting for
//! - `http_rejections_total` (counter): requests refused before the bridge
//!
//! Recording is a no-op until a recorder is installed, so library users
//! that never call [`init_metrics`] pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_bridge_outcome(outcome: &'static str, started: Instant) {
    metrics::counter!("bridge_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("bridge_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_host_ready(ready: bool) {
    metrics::gauge!("bridge_host_ready").set(if ready { 1.0 } else { 0.0 });
}

pub fn record_late_reply() {
    metrics::counter!("bridge_late_replies_total").increment(1);
}

pub fn record_rejection(reason: &'static str) {
    metrics::counter!("http_rejections_total", "reason" => reason).increment(1);
}
