//! Retry policies.
//!
//! Two independent layers are composed by the harvester:
//!
//! - [`TransportRetry`]: a fixed number of attempts with exponential delays,
//!   applied to each HTTP request by [`crate::http::RetryingFetcher`].
//! - [`ElapsedBackoff`]: exponential delays bounded by total elapsed time,
//!   applied by the workers around fetch + decode + protocol check.

use std::time::{Duration, Instant};

/// Count-bounded exponential backoff for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportRetry {
    max_attempts: u32,
    base_delay: Duration,
}

impl TransportRetry {
    /// `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt follows the given zero-based attempt.
    #[must_use]
    pub fn has_attempt_after(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }

    /// Delay before the given zero-based attempt: nothing before the first,
    /// then base, 2×base, 4×base, ...
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Exponential backoff that gives up once a time budget is spent.
#[derive(Debug, Clone)]
pub struct ElapsedBackoff {
    started: Instant,
    next_interval: Duration,
    max_interval: Duration,
    max_elapsed: Duration,
}

impl ElapsedBackoff {
    /// Start the clock now.
    #[must_use]
    pub fn new(initial: Duration, max_interval: Duration, max_elapsed: Duration) -> Self {
        Self {
            started: Instant::now(),
            next_interval: initial,
            max_interval,
            max_elapsed,
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Delay before the next attempt, or `None` when the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let elapsed = self.elapsed();
        self.next_delay_at(elapsed)
    }

    /// Same as [`Self::next_delay`] with an explicit elapsed time.
    ///
    /// The returned delay never reaches past the end of the budget.
    pub fn next_delay_at(&mut self, elapsed: Duration) -> Option<Duration> {
        let remaining = self.max_elapsed.checked_sub(elapsed)?;
        if remaining.is_zero() {
            return None;
        }

        let delay = self.next_interval.min(remaining);
        self.next_interval = self
            .next_interval
            .saturating_mul(2)
            .min(self.max_interval);
        Some(delay)
    }
}
