//! Per-call observation hooks.
//!
//! The pipeline's Observe stage hands every finished call to a list of
//! observers. Observers run inline on the caller's task, so they must not
//! block: logging and metrics recording both only enqueue.

use std::time::Duration;

use uuid::Uuid;

use crate::error::CallError;
use crate::observability::metrics;

/// A finished external call.
#[derive(Debug)]
pub struct CallEvent<'a> {
    pub call_id: Uuid,
    pub service: &'a str,
    pub method: &'a str,
    pub attempts: u32,
    pub elapsed: Duration,
    pub error: Option<&'a CallError>,
}

impl CallEvent<'_> {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn outcome(&self) -> &'static str {
        match self.error {
            None => "success",
            Some(e) => e.kind().as_str(),
        }
    }
}

pub trait CallObserver: Send + Sync {
    fn on_call(&self, event: &CallEvent<'_>);
}

/// Logs failures at warn and successes at debug.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl CallObserver for LogObserver {
    fn on_call(&self, event: &CallEvent<'_>) {
        match event.error {
            None => tracing::debug!(
                call_id = %event.call_id,
                service = %event.service,
                method = %event.method,
                attempts = event.attempts,
                elapsed_ms = event.elapsed.as_millis() as u64,
                "Call succeeded"
            ),
            Some(error) => tracing::warn!(
                call_id = %event.call_id,
                service = %event.service,
                method = %event.method,
                attempts = event.attempts,
                elapsed_ms = event.elapsed.as_millis() as u64,
                kind = %error.kind(),
                error = %error,
                "Call failed"
            ),
        }
    }
}

/// Feeds the `rpc_calls_*` series.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl CallObserver for MetricsObserver {
    fn on_call(&self, event: &CallEvent<'_>) {
        metrics::record_call(event.service, event.method, event.outcome(), event.elapsed);
        if let Some(error) = event.error {
            metrics::record_call_error(event.service, event.method, error.kind());
        }
    }
}
