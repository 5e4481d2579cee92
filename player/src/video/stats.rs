//! Playback statistics tracking
//!
//! Counts display ticks seen by the decode thread, how many the frame clock
//! let through and how many frames were emitted, and logs a summary on an
//! interval.

use std::time::{Duration, Instant};

/// Tracks decode-side playback statistics
pub struct PlaybackStats {
    /// Target rate the clock is configured for
    target_fps: u32,

    /// Display ticks processed while playing
    pub(crate) ticks_observed: u64,

    /// Ticks the frame clock accepted
    pub(crate) ticks_accepted: u64,

    /// Frames handed to the frame sink
    pub(crate) frames_emitted: u64,

    /// Timestamp of the previous accepted tick, for instantaneous rate
    last_accepted_ts: Option<f64>,

    /// Log every accepted tick's rate at trace level
    debug_fps: bool,

    /// Start of the current measurement window
    window_start: Instant,

    /// Frames emitted when the window started
    window_frames: u64,
}

impl PlaybackStats {
    pub fn new(target_fps: u32, debug_fps: bool) -> Self {
        Self {
            target_fps,
            ticks_observed: 0,
            ticks_accepted: 0,
            frames_emitted: 0,
            last_accepted_ts: None,
            debug_fps,
            window_start: Instant::now(),
            window_frames: 0,
        }
    }

    pub fn record_tick(&mut self) {
        self.ticks_observed += 1;
    }

    /// Record an accepted tick at display timestamp `ts` (seconds)
    pub fn record_accepted(&mut self, ts: f64) {
        self.ticks_accepted += 1;

        if self.debug_fps {
            if let Some(last) = self.last_accepted_ts {
                let delta = ts - last;
                if delta > 0.0 {
                    log::trace!("Frame interval {:.1}ms ({:.2} fps)", delta * 1000.0, 1.0 / delta);
                }
            }
        }
        self.last_accepted_ts = Some(ts);
    }

    pub fn record_emitted(&mut self) {
        self.frames_emitted += 1;
    }

    /// Share of observed ticks the clock accepted, as a percentage
    pub fn acceptance_rate(&self) -> f64 {
        if self.ticks_observed == 0 {
            0.0
        } else {
            (self.ticks_accepted as f64 / self.ticks_observed as f64) * 100.0
        }
    }

    /// Frames emitted per second over the current window
    pub fn measured_fps(&self) -> f64 {
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            (self.frames_emitted - self.window_frames) as f64 / elapsed
        }
    }

    /// Log statistics if interval has elapsed
    pub fn maybe_log_stats(&mut self, interval: Duration) {
        if interval.is_zero() || self.window_start.elapsed() < interval {
            return;
        }

        log::info!(
            "Playback stats ({} fps target, {:.2} fps measured): {} emitted, {} of {} ticks accepted ({:.1}%)",
            self.target_fps,
            self.measured_fps(),
            self.frames_emitted,
            self.ticks_accepted,
            self.ticks_observed,
            self.acceptance_rate()
        );

        self.window_start = Instant::now();
        self.window_frames = self.frames_emitted;
    }

    /// Reset statistics counters for a new play-out
    pub fn reset(&mut self) {
        self.ticks_observed = 0;
        self.ticks_accepted = 0;
        self.frames_emitted = 0;
        self.last_accepted_ts = None;
        self.window_start = Instant::now();
        self.window_frames = 0;
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }
}
