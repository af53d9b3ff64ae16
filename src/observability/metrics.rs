//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define engine metrics (attempts, latency, breaker transitions, learning)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-target and aggregate metrics
//!
//! # Metrics
//! - `failover_attempts_total` (counter): attempts by target, outcome
//! - `failover_attempt_duration_seconds` (histogram): invoke latency by target
//! - `failover_circuit_transitions_total` (counter): breaker transitions by key, new state
//! - `failover_preference_updates_total` (counter): routing preference changes by source
//! - `failover_requests_total` (counter): finished requests by status
//! - `failover_batch_duration_seconds` (histogram): wall time per batch
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op, so library users pay nothing
//! - Labels are low-cardinality: target keys come from configuration

use std::net::SocketAddr;
use std::time::Duration;

use ::metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must run inside a Tokio runtime. Failures are logged, not fatal.
pub fn init_metrics(addr: SocketAddr) {
    let builder = match PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Suffix("_duration_seconds".to_string()), DURATION_BUCKETS)
    {
        Ok(builder) => builder,
        Err(e) => {
            tracing::error!(error = %e, "Invalid metrics bucket configuration");
            return;
        }
    };

    match builder.install() {
        Ok(()) => {
            describe_metrics();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn describe_metrics() {
    describe_counter!("failover_attempts_total", Unit::Count, "Attempts by target and outcome");
    describe_histogram!(
        "failover_attempt_duration_seconds",
        Unit::Seconds,
        "Invoke latency per attempt"
    );
    describe_counter!(
        "failover_circuit_transitions_total",
        Unit::Count,
        "Circuit breaker state transitions"
    );
    describe_counter!(
        "failover_preference_updates_total",
        Unit::Count,
        "Routing preference changes"
    );
    describe_counter!("failover_requests_total", Unit::Count, "Finished requests by status");
    describe_histogram!("failover_batch_duration_seconds", Unit::Seconds, "Wall time per batch");
    describe_counter!("failover_config_reloads_total", Unit::Count, "Config file reloads by outcome");
}

/// Record one attempt and its invoke latency.
pub fn record_attempt(target: &str, outcome: &'static str, duration: Duration) {
    counter!("failover_attempts_total", "target" => target.to_string(), "outcome" => outcome).increment(1);
    histogram!("failover_attempt_duration_seconds", "target" => target.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_circuit_transition(key: &str, state: &'static str) {
    counter!("failover_circuit_transitions_total", "key" => key.to_string(), "state" => state).increment(1);
}

pub fn record_preference_update(source: &'static str) {
    counter!("failover_preference_updates_total", "source" => source).increment(1);
}

pub fn record_request(status: &'static str) {
    counter!("failover_requests_total", "status" => status).increment(1);
}

pub fn record_batch(duration: Duration) {
    histogram!("failover_batch_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_config_reload(outcome: &'static str) {
    counter!("failover_config_reloads_total", "outcome" => outcome).increment(1);
}
