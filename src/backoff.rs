//! Reconnect backoff — exponential growth with additive jitter.
//!
//! [`Backoff`] is the policy and a pure function from attempt number to base
//! delay: `floor * 1.5^attempt`, capped at `ceiling`. [`Retry`] carries the
//! attempt counter across failures, adds uniform jitter in `[0, jitter)` to
//! each wait, and resets to the floor after a successful connect.

use std::time::Duration;

use rand::Rng;

/// Growth factor 1.5, kept as an exact ratio.
const GROWTH_NUM: u32 = 3;
const GROWTH_DEN: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    jitter: Duration,
}

impl Backoff {
    /// A ceiling below the floor is raised to the floor.
    #[must_use]
    pub fn new(floor: Duration, ceiling: Duration, jitter: Duration) -> Self {
        Self { floor, ceiling: ceiling.max(floor), jitter }
    }

    #[must_use]
    pub fn floor(&self) -> Duration {
        self.floor
    }

    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    #[must_use]
    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Base delay before retry number `attempt` (0-based), without jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let mut delay = self.floor;
        for _ in 0..attempt {
            if delay >= self.ceiling {
                break;
            }
            delay = (delay * GROWTH_NUM / GROWTH_DEN).min(self.ceiling);
        }
        delay
    }

    #[must_use]
    pub fn retry(&self) -> Retry {
        Retry { policy: *self, attempt: 0 }
    }
}

/// Stateful retry counter over a [`Backoff`] policy.
#[derive(Debug, Clone)]
pub struct Retry {
    policy: Backoff,
    attempt: u32,
}

impl Retry {
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Base delay for the next wait and advance the attempt counter.
    pub fn next_base_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Next wait including jitter.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next_base_delay();
        base + sample_jitter(self.policy.jitter)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

fn sample_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}

#[cfg(test)]
#[path = "backoff_test.rs"]
mod tests;
