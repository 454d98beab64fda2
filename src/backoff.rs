//! Retry backoff state machines.
//!
//! Every retryable RPC step — the metadata fetch at open, each new streaming
//! request, each message receive — gets a fresh [`ExponentialBackoff`] from
//! the channel's [`BackoffFactory`]. Delays grow geometrically up to a cap,
//! with jitter so concurrent channels don't retry in lockstep.

use std::time::Duration;

/// Produces fresh backoff state machines for retryable operations.
#[derive(Debug, Clone, Copy)]
pub struct BackoffFactory {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    max_attempts: usize,
}

impl BackoffFactory {
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        max_attempts: usize,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: multiplier.max(1.0),
            max_attempts: max_attempts.max(1),
        }
    }

    /// A fresh state machine starting back at the initial delay.
    pub fn new_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            next_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            attempts_left: self.max_attempts,
        }
    }
}

impl Default for BackoffFactory {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(10), 2.0, 5)
    }
}

/// Exponential backoff with jitter, capped in delay and attempt count.
#[derive(Debug)]
pub struct ExponentialBackoff {
    next_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    attempts_left: usize,
}

impl ExponentialBackoff {
    /// The sleep to take before the next attempt, or `None` once attempts
    /// are exhausted. The returned delay is jittered into `[0.5, 1.0)` of
    /// the nominal value.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts_left == 0 {
            return None;
        }
        self.attempts_left -= 1;

        let nominal = self.next_delay;
        self.next_delay = nominal.mul_f64(self.multiplier).min(self.max_delay);

        let jitter = 0.5 + rand::random::<f64>() * 0.5;
        Some(nominal.mul_f64(jitter))
    }
}
