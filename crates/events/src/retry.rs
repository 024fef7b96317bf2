//! Redelivery policy for failed message handling.

use std::time::Duration;

use rand::Rng;

/// How the nominal delay grows between redeliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Fixed,
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    Exponential,
}

/// Redelivery policy.
///
/// `max_attempts` counts deliveries, so `max_attempts = 5` means the first
/// delivery plus up to four redeliveries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Fraction of the nominal delay drawn at random on either side of it
    /// (clamped to 0.0..=1.0), so messages that failed together do not all
    /// come back at the same instant.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(5, Duration::from_millis(500), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    /// Dead-letter on the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.2,
        }
    }

    /// Delay before redelivering after `attempt` (1-indexed) failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    fn delay_with<G: Rng + ?Sized>(&self, attempt: u32, rng: &mut G) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let nominal = self.nominal_delay(attempt);
        let spread = nominal.mul_f64(self.jitter.clamp(0.0, 1.0));
        if spread.is_zero() {
            return nominal;
        }
        nominal.saturating_sub(spread) + rng.gen_range(Duration::ZERO..=spread * 2)
    }

    fn nominal_delay(&self, attempt: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }

    /// Is another delivery allowed after `attempt` deliveries failed?
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
