//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define pipeline metrics (calls, latency, errors, attempts, admission)
//! - Expose a Prometheus-compatible scrape endpoint
//! - Track per-service and per-instance series
//!
//! # Metrics
//! - `rpc_calls_total` (counter): calls by service, method, outcome
//! - `rpc_call_duration_seconds` (histogram): end-to-end call latency
//! - `rpc_call_errors_total` (counter): failed calls by error kind
//! - `rpc_attempts_total` (counter): attempts by instance and outcome
//! - `rpc_rate_limited_total` (counter): calls refused admission
//! - `rpc_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `rpc_instances` (gauge): size of the current instance set
//! - `rpc_discovery_resubscribe_total` (counter): feed reconnects
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::ErrorKind;
use crate::resilience::circuit_breaker::BreakerState;

/// Install the Prometheus recorder and its HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_call(service: &str, method: &str, outcome: &'static str, elapsed: Duration) {
    counter!(
        "rpc_calls_total",
        "service" => service.to_string(),
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "rpc_call_duration_seconds",
        "service" => service.to_string(),
        "method" => method.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_call_error(service: &str, method: &str, kind: ErrorKind) {
    counter!(
        "rpc_call_errors_total",
        "service" => service.to_string(),
        "method" => method.to_string(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

pub fn record_attempt(service: &str, address: &str, outcome: &'static str) {
    counter!(
        "rpc_attempts_total",
        "service" => service.to_string(),
        "address" => address.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_rate_limited(service: &str) {
    counter!("rpc_rate_limited_total", "service" => service.to_string()).increment(1);
}

pub fn record_breaker_state(service: &str, state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::Open => 1.0,
        BreakerState::HalfOpen => 2.0,
    };
    gauge!("rpc_breaker_state", "service" => service.to_string()).set(value);
}

pub fn record_instances(service: &str, count: usize) {
    gauge!("rpc_instances", "service" => service.to_string()).set(count as f64);
}

pub fn record_resubscribe(service: &str) {
    counter!("rpc_discovery_resubscribe_total", "service" => service.to_string()).increment(1);
}
