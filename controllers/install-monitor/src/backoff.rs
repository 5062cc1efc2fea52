//! # Fibonacci Backoff
//!
//! Delay before retrying a monitor pass whose listing query failed. Grows
//! more slowly than exponential backoff so a store hiccup does not stall
//! monitoring for long, and is reset by the first pass that succeeds.
//!
//! Sequence with a 10s base and 2m cap: 10s, 10s, 20s, 30s, 50s, 80s, 120s.

use std::time::Duration;

/// Fibonacci backoff calculator
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Backoff starting at `min` and capped at `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Next delay; advances the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);
        result
    }

    /// Restart from `min` after a success
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}
