//! Frame-rate governor
//!
//! Decides, for each display-refresh tick, whether enough time has passed
//! since the last accepted tick to emit the next frame.

/// Interval granularity; matches millisecond display timestamps.
const TICKS_PER_SECOND: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct FrameClock {
    interval: f64,
    last_accepted: Option<f64>,
}

impl FrameClock {
    /// Create a clock for `fps` frames per second.
    ///
    /// The interval is floored to whole milliseconds so repeated
    /// comparisons do not drift. Zero is treated as 1 fps.
    pub fn new(fps: u32) -> Self {
        let fps = fps.max(1);
        let interval = (TICKS_PER_SECOND / fps as f64).floor() / TICKS_PER_SECOND;
        Self {
            interval,
            last_accepted: None,
        }
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Returns true if a frame should be emitted at `timestamp` (seconds).
    ///
    /// Only accepted ticks move the baseline, so a burst of closely spaced
    /// ticks does not push the next emission further out.
    pub fn should_emit(&mut self, timestamp: f64) -> bool {
        match self.last_accepted {
            None => {
                self.last_accepted = Some(timestamp);
                true
            }
            Some(last) if timestamp - last >= self.interval => {
                self.last_accepted = Some(timestamp);
                true
            }
            Some(_) => false,
        }
    }

    /// Forget the last accepted tick; the next call to `should_emit` accepts.
    pub fn clear(&mut self) {
        self.last_accepted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_is_floored_to_millis() {
        assert!((FrameClock::new(30).interval() - 0.033).abs() < 1e-9);
        assert!((FrameClock::new(60).interval() - 0.016).abs() < 1e-9);
        assert!((FrameClock::new(1).interval() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_tick_always_accepted() {
        let mut clock = FrameClock::new(30);
        assert!(clock.should_emit(1234.5));
    }

    #[test]
    fn test_rejected_ticks_do_not_move_baseline() {
        let mut clock = FrameClock::new(30);
        assert!(clock.should_emit(0.0));
        assert!(!clock.should_emit(0.010));
        assert!(!clock.should_emit(0.020));
        assert!(!clock.should_emit(0.030));
        // Measured from 0.0, not from 0.030
        assert!(clock.should_emit(0.034));
        assert!(!clock.should_emit(0.060));
        assert!(clock.should_emit(0.068));
    }

    #[test]
    fn test_at_most_one_emit_per_interval() {
        let mut clock = FrameClock::new(24);
        let interval = clock.interval();
        let mut accepted = Vec::new();

        // 120Hz display
        for i in 0..600 {
            let ts = i as f64 / 120.0;
            if clock.should_emit(ts) {
                accepted.push(ts);
            }
        }

        assert!(!accepted.is_empty());
        for pair in accepted.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[test]
    fn test_clear_resets() {
        let mut clock = FrameClock::new(30);
        assert!(clock.should_emit(10.0));
        assert!(!clock.should_emit(10.001));
        clock.clear();
        assert!(clock.should_emit(10.002));
    }
}
