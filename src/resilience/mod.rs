//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! External call:
//!     → rate_limit.rs (token bucket admission, reject or bounded wait)
//!     → circuit_breaker.rs (gate permit; later attempts re-check)
//!     → retries.rs (attempt loop, backoff.rs delays, sequence timeout)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline; every attempt has its own timeout
//! - Rejections by admission or an open breaker are never retried
//! - Breaker outcomes are reported per attempt, not per call
//! - Each primitive is usable on its own outside the pipeline

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limit;
pub mod retries;

pub use backoff::{Backoff, BackoffKind};
pub use circuit_breaker::{BreakerState, BreakerStats, CircuitBreaker, Outcome, Permit};
pub use rate_limit::{AdmissionMode, RateLimiter};
pub use retries::{Attempt, RetryPolicy};
