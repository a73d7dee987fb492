//! Resilient remote-call pipeline and the HTTP gateway built on it.
//!
//! Callers hold a [`LogicalService`] per remote service and invoke methods on
//! it; each call passes through admission, fault isolation, retries and load
//! balancing over the instance set kept current by discovery.

// Core call path
pub mod context;
pub mod error;
pub mod pipeline;
pub mod transport;

// Membership and selection
pub mod discovery;
pub mod load_balancer;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

// Outer surfaces
pub mod clients;
pub mod gateway;

pub use config::schema::GatewayConfig;
pub use context::CallContext;
pub use error::{CallError, CallResult, ErrorKind};
pub use lifecycle::Shutdown;
pub use pipeline::{LogicalService, Method, ServiceDirectory};
