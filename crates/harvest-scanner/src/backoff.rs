//! Exponential backoff with bounded jitter.

use rand::Rng;
use std::time::Duration;

/// Jitter added on top of the ceiling, as a fraction of it.
const JITTER_FRACTION: f64 = 0.1;

/// Delay schedule: attempt `i` waits `min(max, base * 2^i)` plus up to 10%.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    /// Create a schedule; a `max` below `base` is raised to `base`.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay before jitter for attempt `attempt` (0-based).
    #[must_use]
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay for attempt `attempt` with uniform jitter in `[0, 0.1 * ceiling]`.
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(attempt);
        let jitter = rng.gen_range(0.0..=JITTER_FRACTION);
        ceiling + ceiling.mul_f64(jitter)
    }
}
