//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! Call attempt (instance picked)
//!     → connector.rs (cached connection per address, single-flight dial)
//!     → Dialer::dial (first use only; e.g. http.rs opens an HTTP/2 link)
//!     → Connection::invoke(method, request)
//!     → response payload or TransportError
//!
//! Instance retired by discovery:
//!     → connector.rs release → Connection::close
//!
//! Instance side:
//!     server.rs (axum router answering POST /rpc/{service}/{method})
//! ```
//!
//! # Design Decisions
//! - The pipeline never inspects payloads; they are opaque JSON values
//! - Connections are established lazily, never on discovery events
//! - Only the connector closes connections

pub mod connector;
pub mod http;
pub mod server;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::load_balancer::Instance;

pub use connector::ConnectorFactory;
pub use http::HttpDialer;
pub use server::{RpcServer, RpcStatus};

/// Opaque request/response value carried by the transport.
pub type Payload = serde_json::Value;

/// Errors raised while dialing or invoking an instance.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The instance answered with a non-success status.
    #[error("remote returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Body(String),

    #[error("connection closed")]
    Closed,

    /// The instance left the set while its connection was being set up.
    #[error("instance retired")]
    Retired,

    #[error("{0}")]
    Other(String),
}

/// A live link to one instance.
pub trait Connection: Send + Sync + 'static {
    /// Invoke `method` with `request`. Cancellation is by dropping the future.
    fn invoke<'a>(
        &'a self,
        method: &'a str,
        request: Payload,
    ) -> BoxFuture<'a, Result<Payload, TransportError>>;

    /// Whether the underlying link has gone away and must be re-established.
    fn is_closed(&self) -> bool {
        false
    }

    /// Release the underlying link.
    fn close(&self);
}

/// Establishes connections to instances.
pub trait Dialer: Send + Sync + 'static {
    fn dial<'a>(
        &'a self,
        instance: &'a Instance,
    ) -> BoxFuture<'a, Result<Arc<dyn Connection>, TransportError>>;
}
