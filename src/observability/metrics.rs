//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define breaker metrics
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `faultline_calls_total` (counter): calls by dependency, outcome
//! - `faultline_rejections_total` (counter): fail-fast rejections
//! - `faultline_transitions_total` (counter): state changes by from, to
//! - `faultline_breaker_state` (gauge): 0 closed, 1 half-open, 2 open
//! - `faultline_failure_score` (gauge): current weighted score
//! - `faultline_threshold` (gauge): current open threshold
//! - `faultline_call_duration_seconds` (histogram): call latency
//! - `faultline_cascades_total` (counter): cascade steps by origin, policy
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels stay low-cardinality: dependency names come from config

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_call(dependency: &str, outcome: &'static str, elapsed: Duration) {
    ::metrics::counter!(
        "faultline_calls_total",
        "dependency" => dependency.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!(
        "faultline_call_duration_seconds",
        "dependency" => dependency.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_rejection(dependency: &str) {
    ::metrics::counter!("faultline_rejections_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_transition(dependency: &str, from: CircuitState, to: CircuitState) {
    ::metrics::counter!(
        "faultline_transitions_total",
        "dependency" => dependency.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub fn record_breaker(dependency: &str, state: CircuitState, failure_score: f64, threshold: f64) {
    let dependency = dependency.to_string();
    ::metrics::gauge!("faultline_breaker_state", "dependency" => dependency.clone()).set(f64::from(state.severity()));
    ::metrics::gauge!("faultline_failure_score", "dependency" => dependency.clone()).set(failure_score);
    ::metrics::gauge!("faultline_threshold", "dependency" => dependency).set(threshold);
}

pub fn record_cascade(origin: &str, policy: &'static str) {
    ::metrics::counter!(
        "faultline_cascades_total",
        "origin" => origin.to_string(),
        "policy" => policy
    )
    .increment(1);
}
