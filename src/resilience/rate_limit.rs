//! Token-bucket admission gate, one per logical service.
//!
//! # Responsibilities
//! - Refill continuously at `refill_per_second`, capped at `capacity`
//! - `allow`: take a token or refuse immediately
//! - `wait`: wait for a token, bounded by `max_wait` and the call context
//!
//! # Design Decisions
//! - The bucket starts full
//! - The lock is held only to refill and take; never across a sleep
//! - With a zero refill rate an empty bucket never waits

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::schema::RateLimitConfig;
use crate::context::CallContext;
use crate::error::CallError;
use crate::observability::metrics;

/// Tolerance for float drift in refill arithmetic.
const EPSILON: f64 = 1e-9;

/// What the pipeline does when the bucket is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    /// Refuse the call immediately.
    #[default]
    Reject,
    /// Wait for a token up to `max_wait`.
    Wait,
}

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;
    }

    /// Take a token, or report how long until one is available.
    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> Result<(), Option<Duration>> {
        self.refill(capacity, refill_rate);

        if self.tokens + EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            return Ok(());
        }
        if refill_rate <= 0.0 {
            return Err(None);
        }
        Err(Some(Duration::from_secs_f64((1.0 - self.tokens) / refill_rate)))
    }
}

pub struct RateLimiter {
    service: String,
    capacity: f64,
    refill_rate: f64,
    mode: AdmissionMode,
    max_wait: Duration,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(service: impl Into<String>, capacity: u32, refill_per_second: f64) -> Self {
        let capacity = capacity as f64;
        Self {
            service: service.into(),
            capacity,
            refill_rate: refill_per_second.max(0.0),
            mode: AdmissionMode::Reject,
            max_wait: Duration::ZERO,
            bucket: Mutex::new(TokenBucket {
                tokens: capacity,
                last_update: Instant::now(),
            }),
        }
    }

    pub fn from_config(service: impl Into<String>, config: &RateLimitConfig) -> Self {
        Self::new(service, config.capacity, config.refill_per_second)
            .with_mode(config.mode, Duration::from_millis(config.max_wait_ms))
    }

    pub fn with_mode(mut self, mode: AdmissionMode, max_wait: Duration) -> Self {
        self.mode = mode;
        self.max_wait = max_wait;
        self
    }

    fn lock(&self) -> MutexGuard<'_, TokenBucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(&self) -> Result<(), Option<Duration>> {
        self.lock().try_acquire(self.capacity, self.refill_rate)
    }

    /// Take a token if one is available.
    pub fn allow(&self) -> bool {
        self.try_acquire().is_ok()
    }

    /// Tokens currently in the bucket (after refilling).
    pub fn available(&self) -> f64 {
        let mut bucket = self.lock();
        bucket.refill(self.capacity, self.refill_rate);
        bucket.tokens
    }

    /// Wait until a token is available.
    pub async fn wait(&self, ctx: &CallContext) -> Result<(), CallError> {
        let started = Instant::now();
        let limit = started + self.max_wait;

        loop {
            ctx.check()?;
            let needed = match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(needed) => needed,
            };

            let ready_at = needed.map(|needed| Instant::now() + needed);
            match ready_at {
                Some(ready_at) if ready_at <= limit => {
                    ctx.sleep(ready_at - Instant::now()).await?;
                }
                _ => {
                    return Err(CallError::AdmissionTimeout {
                        service: self.service.clone(),
                        waited: started.elapsed(),
                    });
                }
            }
        }
    }

    /// Run the configured admission mode for one call.
    /// A call that is already cancelled or expired takes no token.
    pub async fn admit(&self, ctx: &CallContext) -> Result<(), CallError> {
        ctx.check()?;
        let result = match self.mode {
            AdmissionMode::Reject if self.allow() => Ok(()),
            AdmissionMode::Reject => Err(CallError::RateLimited {
                service: self.service.clone(),
            }),
            AdmissionMode::Wait => self.wait(ctx).await,
        };

        if let Err(e) = &result {
            if e.kind() == crate::error::ErrorKind::AdmissionRejected {
                tracing::warn!(service = %self.service, error = %e, "Rate limit exceeded");
                metrics::record_rate_limited(&self.service);
            }
        }
        result
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("service", &self.service)
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_zero_refill_rejects_after_capacity() {
        let limiter = RateLimiter::new("feed", 3, 0.0);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!limiter.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_adds_one_token_per_interval() {
        let limiter = RateLimiter::new("feed", 2, 4.0);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        tokio::time::advance(Duration::from_millis(250)).await;
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped() {
        let limiter = RateLimiter::new("feed", 2, 100.0);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!((limiter.available() - 2.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_gets_token_after_refill() {
        let limiter = RateLimiter::new("feed", 1, 10.0)
            .with_mode(AdmissionMode::Wait, Duration::from_secs(1));
        let ctx = CallContext::background();
        assert!(limiter.allow());

        let started = Instant::now();
        limiter.wait(&ctx).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_bounded_by_max_wait() {
        let limiter = RateLimiter::new("feed", 1, 1.0)
            .with_mode(AdmissionMode::Wait, Duration::from_millis(100));
        assert!(limiter.allow());

        let err = limiter.wait(&CallContext::background()).await.unwrap_err();
        assert!(matches!(err, CallError::AdmissionTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_with_zero_refill_fails_immediately() {
        let limiter = RateLimiter::new("feed", 1, 0.0)
            .with_mode(AdmissionMode::Wait, Duration::from_secs(10));
        assert!(limiter.allow());

        let started = Instant::now();
        let err = limiter.wait(&CallContext::background()).await.unwrap_err();
        assert!(matches!(err, CallError::AdmissionTimeout { .. }));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_interrupted_by_context() {
        let limiter = RateLimiter::new("feed", 1, 1.0)
            .with_mode(AdmissionMode::Wait, Duration::from_secs(5));
        assert!(limiter.allow());

        let ctx = CallContext::with_timeout(Duration::from_millis(200));
        let err = limiter.wait(&ctx).await.unwrap_err();
        assert!(matches!(err, CallError::DeadlineExceeded));

        let ctx = CallContext::background();
        ctx.cancel();
        let err = limiter.wait(&ctx).await.unwrap_err();
        assert!(matches!(err, CallError::Cancelled));
    }

    #[tokio::test]
    async fn test_admit_reject_mode() {
        let limiter = RateLimiter::new("feed", 1, 0.0);
        let ctx = CallContext::background();
        assert!(limiter.admit(&ctx).await.is_ok());
        let err = limiter.admit(&ctx).await.unwrap_err();
        assert!(matches!(err, CallError::RateLimited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_call_takes_no_token() {
        let limiter = RateLimiter::new("feed", 2, 0.0);
        let ctx = CallContext::background();
        ctx.cancel();

        let err = limiter.admit(&ctx).await.unwrap_err();
        assert!(matches!(err, CallError::Cancelled));
        assert_eq!(limiter.available(), 2.0);
    }
}
