//! Delays between retry attempts and discovery resubscriptions.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Shape of the delay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Same delay before every retry.
    Fixed,
    /// Doubling delay, capped at `max`.
    #[default]
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    kind: BackoffKind,
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            base: delay,
            max: delay,
            jitter: false,
        }
    }

    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base,
            max: max.max(base),
            jitter: true,
        }
    }

    pub fn new(kind: BackoffKind, base: Duration, max: Duration) -> Self {
        match kind {
            BackoffKind::Fixed => Self::fixed(base),
            BackoffKind::Exponential => Self::exponential(base, max),
        }
    }

    /// Add up to 10% random jitter on top of each delay.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let delay_ms = match self.kind {
            BackoffKind::Fixed => base_ms,
            BackoffKind::Exponential => {
                let factor = 2u64.saturating_pow(attempt - 1);
                base_ms.saturating_mul(factor).min(max_ms)
            }
        };

        let jitter_range = delay_ms / 10;
        let jitter = if self.jitter && jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(delay_ms + jitter)
    }
}
