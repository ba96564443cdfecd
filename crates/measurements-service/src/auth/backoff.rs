//! Delay between key-rotation retries.

use std::time::Duration;

/// Default backoff unit (one second).
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Linear backoff: attempt `n` waits `n * unit`. No jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    unit: Duration,
}

impl BackoffPolicy {
    pub const fn new(unit: Duration) -> Self {
        Self { unit }
    }

    /// Delay to wait after the failed attempt with index `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(attempt)
    }

    /// Total time spent waiting across `retries` retries.
    pub fn total_delay(&self, retries: u32) -> Duration {
        (0..retries).map(|attempt| self.delay(attempt)).sum()
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_UNIT)
    }
}
