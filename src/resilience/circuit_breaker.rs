//! Circuit breaker for logical-service protection.
//!
//! # States
//! - Closed: normal operation, attempts pass through
//! - Open: service assumed down, attempts fail fast
//! - Half-Open: testing whether the service recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first acquire after the cooldown
//! Half-Open → Closed: probe attempt succeeds
//! Half-Open → Open: probe attempt fails (cooldown restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per logical service, shared by all its methods
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open; a probe dropped without an outcome frees
//!   the slot for the next caller
//! - The lock is never held across an await

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::schema::CircuitBreakerConfig;
use crate::error::CallError;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// How one attempt ended, from the breaker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Says nothing about downstream health (cancelled, no instance).
    Ignored,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { probe_in_flight: bool },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    total_successes: u64,
    total_failures: u64,
}

/// Point-in-time view for admin output and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
}

pub struct CircuitBreaker {
    service: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            service: service.into(),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner {
                phase: Phase::Closed {
                    consecutive_failures: 0,
                },
                total_successes: 0,
                total_failures: 0,
            }),
        }
    }

    pub fn from_config(service: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(
            service,
            config.failure_threshold,
            Duration::from_millis(config.cooldown_ms),
        )
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask to run one attempt. The returned permit must be given the
    /// attempt's outcome; dropping it counts as `Outcome::Ignored`.
    pub fn acquire(&self) -> Result<Permit<'_>, CallError> {
        let mut inner = self.lock();
        let phase = inner.phase;
        let probe = match phase {
            Phase::Closed { .. } => false,
            Phase::Open { opened_at } if opened_at.elapsed() >= self.cooldown => {
                inner.phase = Phase::HalfOpen {
                    probe_in_flight: true,
                };
                self.transitioned(BreakerState::HalfOpen);
                true
            }
            Phase::HalfOpen {
                probe_in_flight: false,
            } => {
                inner.phase = Phase::HalfOpen {
                    probe_in_flight: true,
                };
                true
            }
            Phase::Open { .. } | Phase::HalfOpen { .. } => {
                return Err(CallError::CircuitOpen {
                    service: self.service.clone(),
                });
            }
        };

        Ok(Permit {
            breaker: self,
            probe,
            recorded: false,
        })
    }

    fn record(&self, probe: bool, outcome: Outcome) {
        let mut inner = self.lock();
        let phase = inner.phase;
        match outcome {
            Outcome::Success => {
                inner.total_successes += 1;
                match phase {
                    Phase::HalfOpen { .. } if probe => {
                        inner.phase = Phase::Closed {
                            consecutive_failures: 0,
                        };
                        self.transitioned(BreakerState::Closed);
                    }
                    Phase::Closed { .. } => {
                        inner.phase = Phase::Closed {
                            consecutive_failures: 0,
                        };
                    }
                    _ => {}
                }
            }
            Outcome::Failure => {
                inner.total_failures += 1;
                match phase {
                    Phase::Closed {
                        consecutive_failures,
                    } => {
                        let consecutive_failures = consecutive_failures + 1;
                        if consecutive_failures >= self.failure_threshold {
                            inner.phase = Phase::Open {
                                opened_at: Instant::now(),
                            };
                            tracing::warn!(
                                service = %self.service,
                                failures = consecutive_failures,
                                cooldown_ms = self.cooldown.as_millis() as u64,
                                "Circuit opened"
                            );
                            self.transitioned(BreakerState::Open);
                        } else {
                            inner.phase = Phase::Closed {
                                consecutive_failures,
                            };
                        }
                    }
                    Phase::HalfOpen { .. } if probe => {
                        inner.phase = Phase::Open {
                            opened_at: Instant::now(),
                        };
                        tracing::warn!(service = %self.service, "Probe failed, circuit re-opened");
                        self.transitioned(BreakerState::Open);
                    }
                    _ => {}
                }
            }
            Outcome::Ignored => {
                if probe && matches!(phase, Phase::HalfOpen { .. }) {
                    inner.phase = Phase::HalfOpen {
                        probe_in_flight: false,
                    };
                }
            }
        }
    }

    fn transitioned(&self, state: BreakerState) {
        tracing::info!(service = %self.service, state = ?state, "Circuit state changed");
        metrics::record_breaker_state(&self.service, state);
    }

    /// Current state. An open breaker whose cooldown has elapsed reports
    /// half-open even before the next acquire.
    pub fn state(&self) -> BreakerState {
        self.stats().state
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.lock();
        let (state, consecutive_failures) = match inner.phase {
            Phase::Closed {
                consecutive_failures,
            } => (BreakerState::Closed, consecutive_failures),
            Phase::Open { opened_at } if opened_at.elapsed() >= self.cooldown => {
                (BreakerState::HalfOpen, 0)
            }
            Phase::Open { .. } => (BreakerState::Open, 0),
            Phase::HalfOpen { .. } => (BreakerState::HalfOpen, 0),
        };
        BreakerStats {
            state,
            consecutive_failures,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service", &self.service)
            .field("failure_threshold", &self.failure_threshold)
            .field("cooldown", &self.cooldown)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Admission to run one attempt.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    recorded: bool,
}

impl Permit<'_> {
    /// Whether this attempt is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record(mut self, outcome: Outcome) {
        self.recorded = true;
        self.breaker.record(self.probe, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.record(self.probe, Outcome::Ignored);
        }
    }
}
