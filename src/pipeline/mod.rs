//! Call pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Caller
//!     → method.rs (typed Method<Req, Resp> / untyped CallPipeline)
//!     → service.rs (LogicalService: ordered stages)
//!         Observe   → observability::observer (log + metrics sinks)
//!         Admission → resilience::rate_limit
//!         Breaker   → resilience::circuit_breaker
//!         Retry     → resilience::retries
//!                       → load_balancer pick → transport::connector → invoke
//!     → response or CallError
//!
//! directory.rs groups LogicalServices by name for the gateway.
//! ```
//!
//! # Design Decisions
//! - The stage order is data, fixed when the service is built
//! - Admission and the breaker gate run once per external call; every
//!   attempt reports its own outcome to the breaker
//! - No global clients: services are built explicitly and passed around

pub mod directory;
pub mod method;
pub mod service;

use serde::Serialize;

pub use directory::ServiceDirectory;
pub use method::{CallPipeline, Method};
pub use service::{LogicalService, ServiceBuilder, ServiceStatus};

/// One step of the call pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Report every finished call to the observers.
    Observe,
    /// Rate limiter.
    Admission,
    /// Circuit breaker gate.
    Breaker,
    /// Attempt loop: balancer, connector, transport.
    Retry,
}
