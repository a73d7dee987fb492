//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → lifecycle::startup builds one LogicalService per [[services]] entry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; membership changes arrive through
//!   discovery, not through config reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CircuitBreakerConfig, DiscoveryBackend, DiscoveryConfig, GatewayConfig, ListenerConfig,
    LogFormat, ObservabilityConfig, RateLimitConfig, RetryConfig, ServiceConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
