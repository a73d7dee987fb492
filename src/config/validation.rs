//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check uniqueness of service names
//! - Validate value ranges (timeouts > 0, thresholds >= 1, addresses valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{DiscoveryBackend, GatewayConfig, ServiceConfig};
use crate::load_balancer::Instance;
use crate::resilience::backoff::BackoffKind;

/// One semantic problem, located by its config path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.discovery.backend == DiscoveryBackend::File && config.discovery.path.is_none() {
        errors.push(ValidationError::new(
            "discovery.path",
            "required by the file backend",
        ));
    }
    if config.discovery.event_buffer == 0 {
        errors.push(ValidationError::new("discovery.event_buffer", "must be > 0"));
    }

    if config.services.is_empty() {
        errors.push(ValidationError::new("services", "at least one service is required"));
    }

    let mut seen = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        let prefix = format!("services[{}]", i);
        if !service.name.is_empty() && !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", prefix),
                format!("duplicate service '{}'", service.name),
            ));
        }
        validate_service(&prefix, service, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_service(prefix: &str, service: &ServiceConfig, errors: &mut Vec<ValidationError>) {
    let mut push = |field: &str, message: String| {
        errors.push(ValidationError::new(format!("{}.{}", prefix, field), message));
    };

    if service.name.is_empty() {
        push("name", "must not be empty".into());
    } else if service.name.contains('/') {
        push("name", "must not contain '/'".into());
    }

    for address in &service.instances {
        if let Err(e) = Instance::new(address.clone(), 0) {
            push("instances", e.to_string());
        }
    }

    let rate = &service.rate_limit;
    if rate.enabled {
        if rate.capacity == 0 {
            push("rate_limit.capacity", "must be >= 1".into());
        }
        if !rate.refill_per_second.is_finite() || rate.refill_per_second < 0.0 {
            push("rate_limit.refill_per_second", "must be a non-negative number".into());
        }
    }

    let breaker = &service.circuit_breaker;
    if breaker.enabled {
        if breaker.failure_threshold == 0 {
            push("circuit_breaker.failure_threshold", "must be >= 1".into());
        }
        if breaker.cooldown_ms == 0 {
            push("circuit_breaker.cooldown_ms", "must be > 0".into());
        }
    }

    let retries = &service.retries;
    if retries.max_attempts == 0 {
        push("retries.max_attempts", "must be >= 1".into());
    }
    if retries.backoff == BackoffKind::Exponential && retries.max_delay_ms < retries.base_delay_ms {
        push("retries.max_delay_ms", "must be >= base_delay_ms".into());
    }
    if retries.timeout_ms == Some(0) {
        push("retries.timeout_ms", "must be > 0 when set".into());
    }

    if service.timeouts.connect_ms == 0 {
        push("timeouts.connect_ms", "must be > 0".into());
    }
    if service.timeouts.attempt_ms == 0 {
        push("timeouts.attempt_ms", "must be > 0".into());
    }
}
