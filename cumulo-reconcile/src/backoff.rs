//! Wait-interval policy and wall-clock deadlines for poll loops.

use std::time::{Duration, Instant};

use rand::Rng;

/// Capped exponential backoff with jitter.
///
/// `delay(0)` is the wait before the second attempt. With the default
/// policy the sequence is roughly 1s, 2s, 4s, ... capped at 30s, each
/// scaled by a random factor in `[0.5, 1.5]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Base delay for the first wait.
    pub initial: Duration,
    /// Upper bound for any single delay, before jitter.
    pub max: Duration,
    /// Growth factor between attempts.
    pub multiplier: f64,
    /// Jitter fraction in `0.0..=1.0`; each delay is scaled by a random
    /// factor in `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.5,
        }
    }
}

impl Backoff {
    /// Constant-interval polling without jitter.
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            initial: interval,
            max: interval,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Delay before attempt `attempt + 1` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        // Exponent clamp keeps the f64 math finite for long-running loops.
        let exp = self.multiplier.powi(attempt.min(24) as i32);
        let capped = (self.initial.as_secs_f64() * exp).min(self.max.as_secs_f64());
        let factor = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64(capped * factor)
    }
}

/// Wall-clock budget for one poll operation, captured once at the start
/// and shared across all attempts within that operation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start the clock with the given budget.
    pub fn after(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    /// Time spent since the operation started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Whether the budget is spent.
    pub fn expired(&self) -> bool {
        self.elapsed() >= self.budget
    }

    /// Clip a wait so it never runs past the deadline.
    pub fn clamp(&self, wait: Duration) -> Duration {
        wait.min(self.budget.saturating_sub(self.elapsed()))
    }
}
