//! Playback orchestration
//!
//! A [`PlaybackEngine`] owns at most one session at a time. A session is a
//! dedicated decode thread holding a [`FrameSource`] and a [`FrameClock`]:
//! every display tick is offered to the clock, and each accepted tick
//! fetches one frame and hands it to the [`FrameSink`].
//!
//! # State machine
//!
//! ```text
//! Idle ──play──▶ Playing ◀──resume── Paused ◀──play_paused── Idle
//!                  │  └────pause────▶  │
//!                  ▼                   │
//!               Finished               │
//!   (any) ──purge──▶ Purged ◀──────────┘
//! ```
//!
//! Reaching the end of the shorter stream, or a read error, finishes the
//! session: the clock is cleared, observers are told, and the decode thread
//! exits and releases its readers. A later `play()` starts a new session
//! with a new frame source.
//!
//! [`FrameClock`]: crate::clock::FrameClock

mod session;
mod ticker;

use crate::config::{PacingMode, PlayerConfig};
use crate::lock;
use crate::video::{DecoderBackend, FrameSource};
use common::{Frame, MediaError, PlaybackError, PlaybackState, SourceSpec};
pub(crate) use session::on_decode_thread;
use session::{Command, Session, SessionParams};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

/// Receives decoded frames and stream outcome, on the decode thread.
pub trait FrameSink: Send + Sync {
    fn did_output_frame(&self, frame: Frame);
    fn did_receive_error(&self, error: &MediaError);
    fn did_complete(&self);
}

/// Receives playback milestones, on the decode thread.
pub trait EngineDelegate: Send + Sync {
    /// `index` counts emitted frames from 1 within a play-out
    fn did_update_frame(&self, index: u64);
    fn did_finish_playing(&self);
}

/// Engine state visible to both the control API and the decode thread
pub(crate) struct EngineShared {
    state: Mutex<PlaybackState>,
    frame_index: AtomicU64,
}

impl EngineShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(PlaybackState::Idle),
            frame_index: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> PlaybackState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: PlaybackState) {
        *lock(&self.state) = state;
    }

    /// Enter Finished unless already purged
    pub(crate) fn finish(&self) {
        let mut state = lock(&self.state);
        if *state != PlaybackState::Purged {
            *state = PlaybackState::Finished;
        }
    }

    /// Apply `to` only when currently in `from`
    fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        let mut state = lock(&self.state);
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_frame_index(&self, index: u64) {
        self.frame_index.store(index, Ordering::Release);
    }

    fn frame_index(&self) -> u64 {
        self.frame_index.load(Ordering::Acquire)
    }
}

/// Session tuning that does not change between play-outs
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub pacing: PacingMode,
    pub stats_interval: Duration,
    pub debug_fps: bool,
}

impl EngineOptions {
    pub fn from_config(config: &PlayerConfig) -> Self {
        Self {
            pacing: config.pacing_mode(),
            stats_interval: config.stats_interval(),
            debug_fps: config.advanced.debug_fps,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&PlayerConfig::default())
    }
}

pub struct PlaybackEngine {
    spec: SourceSpec,
    fps: u32,
    options: EngineOptions,
    backend: Arc<dyn DecoderBackend>,
    sink: Arc<dyn FrameSink>,
    delegate: Arc<dyn EngineDelegate>,
    shared: Arc<EngineShared>,
    session: Mutex<Option<Session>>,
}

impl PlaybackEngine {
    pub fn new(
        spec: SourceSpec,
        fps: u32,
        backend: Arc<dyn DecoderBackend>,
        sink: Arc<dyn FrameSink>,
        delegate: Arc<dyn EngineDelegate>,
    ) -> Self {
        let clamped = fps.clamp(1, 240);
        if clamped != fps {
            log::warn!("Requested {} fps, using {}", fps, clamped);
        }

        Self {
            spec,
            fps: clamped,
            options: EngineOptions::default(),
            backend,
            sink,
            delegate,
            shared: Arc::new(EngineShared::new()),
            session: Mutex::new(None),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    /// Index of the last emitted frame, 0 before the first
    pub fn frame_index(&self) -> u64 {
        self.shared.frame_index()
    }

    /// Reset the readers and start playing from the first frame.
    ///
    /// Blocks until the readers are attached; an attach failure is
    /// returned here and playback does not start.
    pub fn play(&self) -> Result<(), PlaybackError> {
        self.start(false)
    }

    /// Like [`play`](Self::play), but hold the first frame until
    /// [`resume`](Self::resume).
    pub fn play_paused(&self) -> Result<(), PlaybackError> {
        self.start(true)
    }

    fn start(&self, paused: bool) -> Result<(), PlaybackError> {
        let mut slot = lock(&self.session);

        // A finished session may exit between the check and the send
        for _ in 0..2 {
            if !slot.as_ref().is_some_and(Session::is_running) {
                if let Some(stale) = slot.take() {
                    stale.retire();
                }
                *slot = Some(self.spawn_session()?);
            }

            let Some(session) = slot.as_ref() else {
                return Err(PlaybackError::EngineStopped);
            };

            let (reply, response) = mpsc::sync_channel(1);
            if !session.send(Command::Play { paused, reply }) {
                continue;
            }
            match response.recv() {
                Ok(result) => return result.map_err(PlaybackError::from),
                Err(_) => continue,
            }
        }

        Err(PlaybackError::EngineStopped)
    }

    /// Stop accepting ticks. No-op unless playing.
    pub fn pause(&self) {
        if self
            .shared
            .transition(PlaybackState::Playing, PlaybackState::Paused)
        {
            log::debug!("Playback paused at frame {}", self.frame_index());
            self.wake();
        }
    }

    /// Accept ticks again. No-op unless paused.
    pub fn resume(&self) {
        if self
            .shared
            .transition(PlaybackState::Paused, PlaybackState::Playing)
        {
            log::debug!("Playback resumed at frame {}", self.frame_index());
            self.wake();
        }
    }

    /// Stop the session and release its readers.
    ///
    /// When this returns (off the decode thread) no further notification
    /// from the session will be delivered.
    pub fn purge(&self) {
        let session = lock(&self.session).take();
        if let Some(session) = session {
            session.retire();
            log::debug!("Playback session purged");
        }
        self.shared.set_state(PlaybackState::Purged);
    }

    /// Forward a display-refresh timestamp (seconds) to the decode thread
    pub fn display_tick(&self, timestamp: f64) {
        if let Some(session) = lock(&self.session).as_ref() {
            session.send(Command::Tick(timestamp));
        }
    }

    fn wake(&self) {
        if let Some(session) = lock(&self.session).as_ref() {
            session.send(Command::Wake);
        }
    }

    fn spawn_session(&self) -> Result<Session, PlaybackError> {
        log::debug!("Starting playback session at {} fps", self.fps);
        Session::spawn(SessionParams {
            source: FrameSource::new(&self.spec, Arc::clone(&self.backend)),
            fps: self.fps,
            pacing: self.options.pacing,
            stats_interval: self.options.stats_interval,
            debug_fps: self.options.debug_fps,
            shared: Arc::clone(&self.shared),
            sink: Arc::clone(&self.sink),
            delegate: Arc::clone(&self.delegate),
        })
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.purge();
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("spec", &self.spec)
            .field("fps", &self.fps)
            .field("state", &self.state())
            .finish()
    }
}
