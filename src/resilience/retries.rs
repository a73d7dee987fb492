//! Retry logic.
//!
//! # Responsibilities
//! - Run an operation up to `max_attempts` times
//! - Bound the whole sequence by the caller's deadline and an optional
//!   sequence timeout
//! - Wait a fixed or exponential (jittered) delay between attempts
//!
//! # Design Decisions
//! - Only errors classified retryable are retried; circuit-open,
//!   admission, codec and cancellation errors end the sequence at once
//! - When the sequence timeout cuts an inter-attempt delay short, the
//!   caller sees the last attempt's error rather than a bare timeout
//! - Every attempt gets its own clone of the sequence context

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::schema::RetryConfig;
use crate::context::CallContext;
use crate::error::{CallError, ErrorKind};
use crate::resilience::backoff::Backoff;

/// Handed to the operation on every attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    /// Context bounding this attempt (caller deadline and sequence timeout).
    pub ctx: CallContext,
}

/// Per-call retry bookkeeping. Never shared across calls.
#[derive(Debug)]
struct RetryContext {
    attempt: u32,
    deadline: Option<Instant>,
    last_error: Option<CallError>,
}

impl RetryContext {
    /// Resolve the error to report when the sequence context ended.
    fn interrupted(&mut self, interrupt: CallError, caller: &CallContext) -> CallError {
        if let Err(e) = caller.check() {
            return e;
        }
        self.last_error.take().unwrap_or(interrupt)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    sequence_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            sequence_timeout: None,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let backoff = Backoff::new(
            config.backoff,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        );
        let attempts = if config.enabled { config.max_attempts } else { 1 };
        Self::new(attempts, backoff)
            .with_sequence_timeout(config.timeout_ms.map(Duration::from_millis))
    }

    pub fn with_sequence_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.sequence_timeout = timeout;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// exhausts the attempt budget or runs out of time.
    pub async fn execute<T, F, Fut>(
        &self,
        ctx: &CallContext,
        mut operation: F,
    ) -> Result<T, CallError>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let sequence = match self.sequence_timeout {
            Some(timeout) => ctx.child_with_timeout(timeout),
            None => ctx.clone(),
        };
        let mut state = RetryContext {
            attempt: 0,
            deadline: sequence.deadline(),
            last_error: None,
        };

        loop {
            state.attempt += 1;
            if let Err(e) = sequence.check() {
                return Err(state.interrupted(e, ctx));
            }

            let error = match operation(Attempt {
                number: state.attempt,
                ctx: sequence.clone(),
            })
            .await
            {
                Ok(value) => return Ok(value),
                Err(e) if e.kind() == ErrorKind::Cancelled => return Err(state.interrupted(e, ctx)),
                Err(e) => e,
            };

            if !error.is_retryable() || state.attempt >= self.max_attempts {
                if error.is_retryable() {
                    tracing::warn!(
                        attempts = state.attempt,
                        error = %error,
                        "Retry budget exhausted"
                    );
                }
                return Err(error);
            }

            let delay = self.backoff.delay(state.attempt);
            tracing::debug!(
                attempt = state.attempt,
                delay_ms = delay.as_millis() as u64,
                remaining_ms = ?state
                    .deadline
                    .map(|d| d.saturating_duration_since(Instant::now()).as_millis() as u64),
                error = %error,
                "Retrying after failure"
            );
            state.last_error = Some(error);

            if let Err(e) = sequence.sleep(delay).await {
                return Err(state.interrupted(e, ctx));
            }
        }
    }
}
