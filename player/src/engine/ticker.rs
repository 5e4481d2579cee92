//! Display-refresh tick generator for internal pacing

use std::time::{Duration, Instant};

/// Produces refresh timestamps at a fixed rate.
///
/// Timestamps are seconds since the ticker was (re)started. Missed ticks
/// are skipped rather than delivered in a burst.
#[derive(Debug)]
pub(crate) struct DisplayTicker {
    period: Duration,
    epoch: Instant,
    next: Instant,
}

impl DisplayTicker {
    pub(crate) fn new(refresh_hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / refresh_hz.max(1) as f64);
        let now = Instant::now();
        Self {
            period,
            epoch: now,
            next: now,
        }
    }

    pub(crate) fn restart(&mut self) {
        let now = Instant::now();
        self.epoch = now;
        self.next = now;
    }

    /// Time left until the next tick is due
    pub(crate) fn until_next(&self) -> Duration {
        self.next.saturating_duration_since(Instant::now())
    }

    /// Consume the due tick and return its timestamp
    pub(crate) fn fire(&mut self) -> f64 {
        let now = Instant::now();
        self.next += self.period;
        if self.next <= now {
            self.next = now + self.period;
        }
        now.duration_since(self.epoch).as_secs_f64()
    }
}
