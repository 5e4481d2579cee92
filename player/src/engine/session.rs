//! One playback session: a decode thread, its frame source and its clock

use super::ticker::DisplayTicker;
use super::{EngineDelegate, EngineShared, FrameSink};
use crate::clock::FrameClock;
use crate::config::PacingMode;
use crate::video::{FrameSource, PlaybackStats};
use crate::{emit_if_alive, lock};
use common::{MediaError, PlaybackError, PlaybackState};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

thread_local! {
    static DECODE_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// True on any session's decode thread, including inside its notifications
pub(crate) fn on_decode_thread() -> bool {
    DECODE_THREAD.with(Cell::get)
}

pub(super) enum Command {
    Play {
        paused: bool,
        reply: mpsc::SyncSender<Result<(), MediaError>>,
    },
    /// Re-evaluate pacing after a pause/resume
    Wake,
    Tick(f64),
    Purge,
}

/// Serializes notifications against retirement.
///
/// Once closed, no further notification leaves the session. Closing from
/// another thread waits for an in-flight notification to return.
pub(crate) struct EmissionGate {
    alive: AtomicBool,
    lock: Mutex<()>,
}

impl EmissionGate {
    fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        lock(&self.lock)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Close the gate, waiting out any notification in flight
    fn close(&self) {
        let _guard = self.lock();
        self.alive.store(false, Ordering::Release);
    }

    /// Close the gate from inside a notification on the decode thread
    fn close_reentrant(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Everything a decode thread needs
pub(super) struct SessionParams {
    pub source: FrameSource,
    pub fps: u32,
    pub pacing: PacingMode,
    pub stats_interval: Duration,
    pub debug_fps: bool,
    pub shared: Arc<EngineShared>,
    pub sink: Arc<dyn FrameSink>,
    pub delegate: Arc<dyn EngineDelegate>,
}

/// Control handle for a running decode thread
pub(super) struct Session {
    commands: mpsc::Sender<Command>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
    gate: Arc<EmissionGate>,
    running: Arc<AtomicBool>,
}

impl Session {
    pub(super) fn spawn(params: SessionParams) -> Result<Self, PlaybackError> {
        let (commands, receiver) = mpsc::channel();
        let gate = Arc::new(EmissionGate::new());
        let running = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            clock: FrameClock::new(params.fps),
            stats: PlaybackStats::new(params.fps, params.debug_fps),
            ticker: match params.pacing {
                PacingMode::Internal { refresh_hz } => Some(DisplayTicker::new(refresh_hz)),
                PacingMode::External => None,
            },
            source: params.source,
            stats_interval: params.stats_interval,
            shared: params.shared,
            sink: params.sink,
            delegate: params.delegate,
            gate: Arc::clone(&gate),
            running: Arc::clone(&running),
            index: 0,
        };

        let handle = thread::Builder::new()
            .name("alphaplay-decode".into())
            .spawn(move || worker.run(receiver))
            .map_err(|e| PlaybackError::Spawn(e.to_string()))?;
        let thread_id = handle.thread().id();

        Ok(Self {
            commands,
            handle: Some(handle),
            thread_id,
            gate,
            running,
        })
    }

    /// Still able to accept a Play command
    pub(super) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && self.gate.is_alive()
    }

    pub(super) fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    fn on_decode_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Stop the session. Returns once no further notification can leave it,
    /// unless called from the session's own decode thread.
    pub(super) fn retire(mut self) {
        if self.on_decode_thread() {
            // The loop notices the closed gate when the current callback returns
            self.gate.close_reentrant();
            self.handle.take();
            return;
        }

        self.gate.close();
        self.send(Command::Purge);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Decode thread panicked");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.handle.is_some() {
            // Dropped without retire(); detach but make sure nothing else is emitted
            self.gate.close_reentrant();
            let _ = self.commands.send(Command::Purge);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

struct Worker {
    source: FrameSource,
    clock: FrameClock,
    stats: PlaybackStats,
    ticker: Option<DisplayTicker>,
    stats_interval: Duration,
    shared: Arc<EngineShared>,
    sink: Arc<dyn FrameSink>,
    delegate: Arc<dyn EngineDelegate>,
    gate: Arc<EmissionGate>,
    running: Arc<AtomicBool>,
    index: u64,
}

impl Worker {
    fn run(mut self, commands: mpsc::Receiver<Command>) {
        DECODE_THREAD.with(|flag| flag.set(true));
        log::debug!("Decode thread started");

        loop {
            let wait = if self.shared.state() == PlaybackState::Playing {
                self.ticker.as_ref().map(DisplayTicker::until_next)
            } else {
                None
            };

            let command = match wait {
                Some(timeout) => match commands.recv_timeout(timeout) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => match self.ticker.as_mut() {
                        Some(ticker) => Command::Tick(ticker.fire()),
                        None => Command::Wake,
                    },
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match commands.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            let flow = match command {
                Command::Play { paused, reply } => {
                    let result = self.start(paused);
                    if reply.send(result).is_err() {
                        log::debug!("Play caller went away before the reply");
                    }
                    Flow::Continue
                }
                Command::Wake => Flow::Continue,
                Command::Tick(ts) => self.tick(ts),
                Command::Purge => Flow::Exit,
            };

            if flow == Flow::Exit || !self.gate.is_alive() {
                break;
            }
        }

        self.running.store(false, Ordering::Release);
        self.source.cancel_reading();
        log::debug!(
            "Decode thread exiting after {} frames",
            self.stats.frames_emitted()
        );
    }

    /// Reset the readers and enter Playing, or Paused on the first frame
    fn start(&mut self, paused: bool) -> Result<(), MediaError> {
        if let Err(e) = self.source.reset() {
            self.source.cancel_reading();
            return Err(e);
        }

        self.index = 0;
        self.shared.set_frame_index(0);
        self.clock.clear();
        self.stats.reset();
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.restart();
        }

        if paused {
            self.shared.set_state(PlaybackState::Paused);
            log::info!("Playback started paused");
        } else {
            self.shared.set_state(PlaybackState::Playing);
            log::info!("Playback started");
        }
        Ok(())
    }

    fn tick(&mut self, ts: f64) -> Flow {
        if self.shared.state() != PlaybackState::Playing {
            return Flow::Continue;
        }

        self.stats.record_tick();
        if !self.clock.should_emit(ts) {
            return Flow::Continue;
        }
        self.stats.record_accepted(ts);
        log::trace!("Accepted tick at {:.3}s", ts);

        if self.source.is_exhausted() {
            self.finish(None);
            return Flow::Exit;
        }

        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Failed to read next frame: {}", e);
                self.finish(Some(e));
                return Flow::Exit;
            }
        };

        if !emit_if_alive!(self.gate, self.sink.did_output_frame(frame)) {
            return Flow::Exit;
        }

        self.index += 1;
        self.shared.set_frame_index(self.index);
        self.stats.record_emitted();
        let index = self.index;
        emit_if_alive!(self.gate, self.delegate.did_update_frame(index));

        self.stats.maybe_log_stats(self.stats_interval);
        Flow::Continue
    }

    fn finish(&mut self, error: Option<MediaError>) {
        self.running.store(false, Ordering::Release);
        self.shared.finish();
        self.clock.clear();

        match &error {
            Some(e) => log::info!("Playback ended by error after {} frames: {}", self.index, e),
            None => log::info!("Playback finished after {} frames", self.index),
        }

        if let Some(e) = &error {
            emit_if_alive!(self.gate, self.sink.did_receive_error(e));
        }
        emit_if_alive!(self.gate, self.sink.did_complete());
        emit_if_alive!(self.gate, self.delegate.did_finish_playing());

        self.source.cancel_reading();
    }
}
