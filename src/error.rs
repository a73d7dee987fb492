//! Call error taxonomy.
//!
//! Every error that reaches a caller is attributed to exactly one
//! [`ErrorKind`] so upstream code can decide on further backoff.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::transport::TransportError;

/// Coarse classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rate limiter denied the call or timed out waiting for a token.
    AdmissionRejected,
    /// Circuit breaker refused the call.
    CircuitOpen,
    /// The instance set was empty.
    NoInstance,
    /// A transport connection could not be established.
    ConnectionFailed,
    /// The remote invocation itself failed.
    RemoteCallFailed,
    /// The caller's context was cancelled or its deadline passed.
    Cancelled,
}

impl ErrorKind {
    /// Label used in metrics and admin output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AdmissionRejected => "admission_rejected",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::NoInstance => "no_instance",
            ErrorKind::ConnectionFailed => "connection_failed",
            ErrorKind::RemoteCallFailed => "remote_call_failed",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the call pipeline.
#[derive(Debug, Error)]
pub enum CallError {
    /// Token bucket was empty and the service rejects instead of waiting.
    #[error("rate limit exceeded for service '{service}'")]
    RateLimited { service: String },

    /// Waited longer than the configured bound for a token.
    #[error("timed out after {waited:?} waiting for admission to service '{service}'")]
    AdmissionTimeout { service: String, waited: Duration },

    #[error("circuit open for service '{service}'")]
    CircuitOpen { service: String },

    #[error("no instances available for service '{service}'")]
    NoInstances { service: String },

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: TransportError,
    },

    #[error("call {method} on {address} failed: {source}")]
    Remote {
        address: String,
        method: String,
        #[source]
        source: TransportError,
    },

    #[error("call {method} on {address} timed out after {timeout:?}")]
    AttemptTimeout {
        address: String,
        method: String,
        timeout: Duration,
    },

    /// Typed request could not be encoded or the response decoded.
    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("call cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl CallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::RateLimited { .. } | CallError::AdmissionTimeout { .. } => {
                ErrorKind::AdmissionRejected
            }
            CallError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            CallError::NoInstances { .. } => ErrorKind::NoInstance,
            CallError::Connect { .. } => ErrorKind::ConnectionFailed,
            CallError::Remote { .. } | CallError::AttemptTimeout { .. } | CallError::Codec(_) => {
                ErrorKind::RemoteCallFailed
            }
            CallError::Cancelled | CallError::DeadlineExceeded => ErrorKind::Cancelled,
        }
    }

    /// Whether the retry loop may schedule another attempt after this error.
    ///
    /// An empty instance set is retried only after the inter-attempt delay,
    /// giving discovery a chance to publish a new snapshot.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CallError::Connect { .. }
                | CallError::Remote { .. }
                | CallError::AttemptTimeout { .. }
                | CallError::NoInstances { .. }
        )
    }

    /// Whether this outcome says something about downstream health.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(
            self,
            CallError::Connect { .. } | CallError::Remote { .. } | CallError::AttemptTimeout { .. }
        )
    }
}

/// Result type for pipeline calls.
pub type CallResult<T> = Result<T, CallError>;
