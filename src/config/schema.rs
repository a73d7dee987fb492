//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::load_balancer::BalancerKind;
use crate::resilience::backoff::BackoffKind;
use crate::resilience::rate_limit::AdmissionMode;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration for the HTTP front.
    pub listener: ListenerConfig,

    /// Where instance membership comes from.
    pub discovery: DiscoveryConfig,

    /// Logical services the gateway can call.
    pub services: Vec<ServiceConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Upper bound on one gateway request, in seconds.
    pub request_timeout_secs: u64,

    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryBackend {
    /// Fixed instance lists from each service's `instances`.
    #[default]
    Static,
    /// TOML registry file watched for changes.
    File,
}

/// Discovery configuration shared by all services.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub backend: DiscoveryBackend,

    /// Registry file (file backend only).
    pub path: Option<PathBuf>,

    /// First resubscribe delay after a backend failure, in milliseconds.
    pub retry_base_ms: u64,

    /// Largest resubscribe delay, in milliseconds.
    pub retry_max_ms: u64,

    /// Membership events buffered between the feed and its service.
    pub event_buffer: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            backend: DiscoveryBackend::Static,
            path: None,
            retry_base_ms: 500,
            retry_max_ms: 30_000,
            event_buffer: 64,
        }
    }
}

/// One logical service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name used for discovery and routing (e.g., "feed").
    pub name: String,

    /// Instance addresses for the static discovery backend.
    pub instances: Vec<String>,

    pub load_balancer: BalancerKind,

    pub rate_limit: RateLimitConfig,

    pub circuit_breaker: CircuitBreakerConfig,

    pub retries: RetryConfig,

    pub timeouts: TimeoutConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            instances: Vec::new(),
            load_balancer: BalancerKind::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retries: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Token bucket admission for one service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Bucket capacity (burst size). The bucket starts full.
    pub capacity: u32,

    /// Tokens added per second.
    pub refill_per_second: f64,

    /// Reject immediately or wait for a token.
    pub mode: AdmissionMode,

    /// Longest admission wait in `wait` mode, in milliseconds.
    pub max_wait_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 100,
            refill_per_second: 100.0,
            mode: AdmissionMode::Reject,
            max_wait_ms: 100,
        }
    }
}

/// Circuit breaker for one service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable the breaker.
    pub enabled: bool,

    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open before a probe, in milliseconds.
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            cooldown_ms: 5_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries. Disabled means exactly one attempt.
    pub enabled: bool,

    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,

    /// Delay curve between attempts.
    pub backoff: BackoffKind,

    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Bound on the whole attempt sequence in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            base_delay_ms: 50,
            max_delay_ms: 500,
            timeout_ms: Some(1_000),
        }
    }
}

/// Timeout configuration for one service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Bound on a single attempt in milliseconds.
    pub attempt_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 500,
            attempt_ms: 800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty output for development, JSON for log shipping.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
