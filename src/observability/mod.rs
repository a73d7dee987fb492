//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Call pipeline Observe stage:
//!     → observer.rs (LogObserver, MetricsObserver, custom sinks)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Call ID (UUID v4) carried on the span of every external call
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod observer;

pub use observer::{CallEvent, CallObserver, LogObserver, MetricsObserver};
