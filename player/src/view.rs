//! Host-facing playback view
//!
//! A [`PlaybackView`] owns one engine at a time and wires it to a
//! [`FrameRenderer`] and to the host's [`PlaybackDelegate`]. It also follows
//! host activity: resigning active pauses playback and drops rendering,
//! becoming active again resumes it mid-stream.
//!
//! Engine notifications arrive on the decode thread. Frames and clears go
//! straight to the renderer; client callbacks are re-dispatched to the UI
//! thread. Every engine gets its own session id, and callbacks carrying a
//! stale id are dropped, so a replaced engine can never reach the client.

use crate::config::PlayerConfig;
use crate::dispatch::UiDispatcher;
use crate::engine::{EngineDelegate, EngineOptions, FrameSink, PlaybackEngine, on_decode_thread};
use crate::lifecycle::{LifecycleEvent, LifecycleNotifier, LifecycleObserver};
use crate::lock;
use crate::video::DecoderBackend;
use common::{Frame, MediaError, PlaybackError, PlaybackState, SourceSpec};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError, Weak};

/// Draws frames onto the view's surface.
///
/// Calls come from the decode thread and must not block on the UI thread.
pub trait FrameRenderer: Send + Sync {
    fn composite(&self, frame: Frame);

    /// Present a fully transparent drawable
    fn clear(&self);
}

/// Client notifications, delivered on the UI thread
pub trait PlaybackDelegate: Send + Sync {
    fn on_frame_advanced(&self, index: u64);

    fn on_finished(&self);

    fn on_error(&self, _error: &MediaError) {}
}

struct ViewShared {
    renderer: Arc<dyn FrameRenderer>,
    ui: Arc<dyn UiDispatcher>,
    backend: Arc<dyn DecoderBackend>,
    options: EngineOptions,
    default_fps: u32,
    engine: Mutex<Option<Arc<PlaybackEngine>>>,
    play_lock: Mutex<()>,
    session: AtomicU64,
    active: AtomicBool,
    delegate: Mutex<Option<Arc<dyn PlaybackDelegate>>>,
}

impl ViewShared {
    fn engine(&self) -> Option<Arc<PlaybackEngine>> {
        lock(&self.engine).clone()
    }

    fn is_current(&self, session: u64) -> bool {
        self.session.load(Ordering::Acquire) == session
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Serialize `play()`. A decode thread gives up instead of waiting, since
    /// the holder may be purging that thread's session and waiting on the
    /// callback it is running.
    fn lock_for_play(&self) -> Option<MutexGuard<'_, ()>> {
        if !on_decode_thread() {
            return Some(lock(&self.play_lock));
        }
        match self.play_lock.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn delegate(&self) -> Option<Arc<dyn PlaybackDelegate>> {
        lock(&self.delegate).clone()
    }

    fn handle_lifecycle(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::WillResignActive => {
                self.active.store(false, Ordering::Release);
                if let Some(engine) = self.engine() {
                    engine.pause();
                }
            }
            LifecycleEvent::DidBecomeActive => {
                self.active.store(true, Ordering::Release);
                if let Some(engine) = self.engine() {
                    engine.resume();
                }
            }
        }
    }
}

pub struct PlaybackView {
    shared: Arc<ViewShared>,
    lifecycle: Mutex<Option<LifecycleObserver>>,
}

impl PlaybackView {
    pub fn new(
        renderer: Arc<dyn FrameRenderer>,
        ui: Arc<dyn UiDispatcher>,
        backend: Arc<dyn DecoderBackend>,
        config: &PlayerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(ViewShared {
                renderer,
                ui,
                backend,
                options: EngineOptions::from_config(config),
                default_fps: config.playback.default_fps,
                engine: Mutex::new(None),
                play_lock: Mutex::new(()),
                session: AtomicU64::new(0),
                active: AtomicBool::new(true),
                delegate: Mutex::new(None),
            }),
            lifecycle: Mutex::new(None),
        }
    }

    /// Build a view decoding through the compiled-in platform decoder
    pub fn with_default_backend(
        renderer: Arc<dyn FrameRenderer>,
        ui: Arc<dyn UiDispatcher>,
        config: &PlayerConfig,
    ) -> Result<Self, MediaError> {
        let backend = crate::video::default_backend(config).ok_or_else(|| {
            MediaError::Unavailable("built without a video decoder".to_string())
        })?;
        Ok(Self::new(renderer, ui, backend, config))
    }

    pub fn set_delegate(&self, delegate: Arc<dyn PlaybackDelegate>) {
        *lock(&self.shared.delegate) = Some(delegate);
    }

    /// Replace any current playback with `spec` at `fps` (or the configured default).
    ///
    /// The previous engine is purged before the new one starts; none of its
    /// notifications reach the renderer or the delegate afterwards. An
    /// inactive view starts the new engine paused.
    ///
    /// Called from a client callback while another thread is already inside
    /// `play()`, this returns [`PlaybackError::PlayInProgress`] and the other
    /// call wins.
    pub fn play(&self, spec: SourceSpec, fps: Option<u32>) -> Result<(), PlaybackError> {
        let shared = &self.shared;
        let Some(_serialized) = shared.lock_for_play() else {
            log::warn!(
                "Dropping play of {:?} from a callback: another play is starting",
                spec
            );
            return Err(PlaybackError::PlayInProgress);
        };

        let previous = lock(&shared.engine).take();
        let session = shared.session.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(previous) = previous {
            previous.purge();
        }

        let fps = fps.unwrap_or(shared.default_fps);
        log::info!("Playing {:?} at {} fps (session {})", spec, fps, session);

        let binding = Arc::new(ViewBinding {
            session,
            view: Arc::downgrade(shared),
        });
        let engine = Arc::new(
            PlaybackEngine::new(
                spec,
                fps,
                Arc::clone(&shared.backend),
                binding.clone(),
                binding,
            )
            .with_options(shared.options),
        );
        *lock(&shared.engine) = Some(Arc::clone(&engine));

        let started = if shared.is_active() {
            engine.play()
        } else {
            engine.play_paused()
        };
        if let Err(e) = started {
            log::error!("Failed to start playback: {}", e);
            {
                let mut slot = lock(&shared.engine);
                if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, &engine)) {
                    slot.take();
                }
            }
            engine.purge();
            return Err(e);
        }

        // Resigned active while the engine was starting
        if !shared.is_active() {
            engine.pause();
        }
        Ok(())
    }

    pub fn play_separate(
        &self,
        color: impl AsRef<Path>,
        alpha: impl AsRef<Path>,
        fps: Option<u32>,
    ) -> Result<(), PlaybackError> {
        self.play(SourceSpec::separate_alpha(color, alpha), fps)
    }

    pub fn play_packed(
        &self,
        asset: impl AsRef<Path>,
        fps: Option<u32>,
    ) -> Result<(), PlaybackError> {
        self.play(SourceSpec::packed_alpha(asset), fps)
    }

    pub fn pause(&self) {
        if let Some(engine) = self.shared.engine() {
            engine.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(engine) = self.shared.engine() {
            engine.resume();
        }
    }

    /// Purge the current engine and clear the surface
    pub fn stop(&self) {
        if let Some(engine) = self.shared.engine() {
            engine.purge();
            if self.shared.is_active() {
                self.shared.renderer.clear();
            }
        }
    }

    /// Forward a vsync timestamp (seconds) when pacing externally
    pub fn display_tick(&self, timestamp: f64) {
        if let Some(engine) = self.shared.engine() {
            engine.display_tick(timestamp);
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.shared
            .engine()
            .map_or(PlaybackState::Idle, |engine| engine.state())
    }

    pub fn frame_index(&self) -> u64 {
        self.shared
            .engine()
            .map_or(0, |engine| engine.frame_index())
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Follow `notifier` for the lifetime of the view, replacing any earlier subscription
    pub fn attach_lifecycle(&self, notifier: &LifecycleNotifier) -> std::io::Result<()> {
        let view = Arc::downgrade(&self.shared);
        let observer = LifecycleObserver::spawn(
            notifier,
            Arc::new(move |event| {
                if let Some(view) = view.upgrade() {
                    view.handle_lifecycle(event);
                }
            }),
        )?;
        *lock(&self.lifecycle) = Some(observer);
        Ok(())
    }

    pub fn detach_lifecycle(&self) {
        let observer = lock(&self.lifecycle).take();
        drop(observer);
    }
}

impl Drop for PlaybackView {
    fn drop(&mut self) {
        self.detach_lifecycle();
        if let Some(engine) = lock(&self.shared.engine).take() {
            engine.purge();
        }
    }
}

impl std::fmt::Debug for PlaybackView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackView")
            .field("state", &self.state())
            .field("active", &self.is_active())
            .field("session", &self.shared.session.load(Ordering::Acquire))
            .finish()
    }
}

/// Engine observer for one session of a view
struct ViewBinding {
    session: u64,
    view: Weak<ViewShared>,
}

impl ViewBinding {
    /// The view, while this binding's session is still the current one
    fn current(&self) -> Option<Arc<ViewShared>> {
        self.view
            .upgrade()
            .filter(|view| view.is_current(self.session))
    }

    fn notify_client<F>(&self, notify: F)
    where
        F: FnOnce(&dyn PlaybackDelegate) + Send + 'static,
    {
        let Some(view) = self.current() else {
            return;
        };
        let session = self.session;
        let target = Arc::downgrade(&view);
        view.ui.dispatch(Box::new(move || {
            let Some(view) = target.upgrade() else {
                return;
            };
            if !view.is_current(session) {
                log::trace!("Dropped client callback from session {}", session);
                return;
            }
            if let Some(delegate) = view.delegate() {
                notify(delegate.as_ref());
            }
        }));
    }
}

impl FrameSink for ViewBinding {
    fn did_output_frame(&self, frame: Frame) {
        match self.current() {
            Some(view) if view.is_active() => view.renderer.composite(frame),
            _ => log::trace!("Dropped frame for inactive view"),
        }
    }

    fn did_receive_error(&self, error: &MediaError) {
        if let Some(view) = self.current().filter(|view| view.is_active()) {
            view.renderer.clear();
        }
        let error = error.clone();
        self.notify_client(move |delegate| delegate.on_error(&error));
    }

    fn did_complete(&self) {
        if let Some(view) = self.current().filter(|view| view.is_active()) {
            view.renderer.clear();
        }
    }
}

impl EngineDelegate for ViewBinding {
    fn did_update_frame(&self, index: u64) {
        self.notify_client(move |delegate| delegate.on_frame_advanced(index));
    }

    fn did_finish_playing(&self) {
        self.notify_client(|delegate| delegate.on_finished());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ImmediateDispatcher;
    use crate::video::DecodeSession;
    use common::{ImageBuffer, MediaAsset, PixelLayout};

    #[derive(Default)]
    struct CountingRenderer {
        composites: AtomicU64,
        clears: AtomicU64,
    }

    impl FrameRenderer for CountingRenderer {
        fn composite(&self, _frame: Frame) {
            self.composites.fetch_add(1, Ordering::AcqRel);
        }
        fn clear(&self) {
            self.clears.fetch_add(1, Ordering::AcqRel);
        }
    }

    struct Endless;

    struct EndlessSession(PixelLayout);

    impl DecodeSession for EndlessSession {
        fn next_sample(&mut self) -> Result<Option<ImageBuffer>, MediaError> {
            Ok(Some(ImageBuffer {
                layout: self.0,
                width: 2,
                height: 2,
                planes: Vec::new(),
                colorimetry: Default::default(),
                pts_ns: None,
            }))
        }
        fn cancel(&mut self) {}
    }

    impl DecoderBackend for Endless {
        fn open_session(
            &self,
            _asset: &MediaAsset,
            layout: PixelLayout,
        ) -> Result<Box<dyn DecodeSession>, MediaError> {
            Ok(Box::new(EndlessSession(layout)))
        }
    }

    struct Unattachable;

    impl DecoderBackend for Unattachable {
        fn open_session(
            &self,
            asset: &MediaAsset,
            _layout: PixelLayout,
        ) -> Result<Box<dyn DecodeSession>, MediaError> {
            Err(MediaError::CannotAttachOutput(asset.to_string()))
        }
    }

    #[derive(Default)]
    struct CountingDelegate {
        advanced: AtomicU64,
    }

    impl PlaybackDelegate for CountingDelegate {
        fn on_frame_advanced(&self, _index: u64) {
            self.advanced.fetch_add(1, Ordering::AcqRel);
        }
        fn on_finished(&self) {}
    }

    fn view() -> (PlaybackView, Arc<CountingRenderer>) {
        let mut config = PlayerConfig::default();
        config.playback.pacing = "external".into();
        config.advanced.stats_interval_secs = 0;
        let renderer = Arc::new(CountingRenderer::default());
        let view = PlaybackView::new(
            renderer.clone(),
            Arc::new(ImmediateDispatcher),
            Arc::new(Endless),
            &config,
        );
        (view, renderer)
    }

    #[test]
    fn test_state_before_play() {
        let (view, _) = view();
        assert_eq!(view.state(), PlaybackState::Idle);
        assert_eq!(view.frame_index(), 0);
        assert!(view.is_active());
        view.pause();
        view.display_tick(0.0);
    }

    #[test]
    fn test_play_replaces_session() {
        let (view, _) = view();
        view.play_packed("/a.mov", Some(30)).unwrap();
        view.play_packed("/b.mov", None).unwrap();
        assert_eq!(view.shared.session.load(Ordering::Acquire), 2);
        assert_eq!(view.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_stale_binding_is_silent() {
        let (view, renderer) = view();
        view.play_packed("/a.mov", Some(30)).unwrap();
        let stale = ViewBinding {
            session: 1,
            view: Arc::downgrade(&view.shared),
        };
        view.play_packed("/b.mov", Some(30)).unwrap();

        stale.did_complete();
        assert_eq!(renderer.clears.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_stop_purges_and_clears() {
        let (view, renderer) = view();
        view.play_packed("/a.mov", Some(30)).unwrap();
        view.stop();
        assert_eq!(view.state(), PlaybackState::Purged);
        assert_eq!(renderer.clears.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_lifecycle_pauses_and_resumes() {
        let (view, _) = view();
        view.play_packed("/a.mov", Some(30)).unwrap();

        view.shared.handle_lifecycle(LifecycleEvent::WillResignActive);
        assert!(!view.is_active());
        assert_eq!(view.state(), PlaybackState::Paused);

        view.shared.handle_lifecycle(LifecycleEvent::DidBecomeActive);
        assert!(view.is_active());
        assert_eq!(view.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_failed_play_leaves_no_engine() {
        let mut config = PlayerConfig::default();
        config.playback.pacing = "external".into();
        let view = PlaybackView::new(
            Arc::new(CountingRenderer::default()),
            Arc::new(ImmediateDispatcher),
            Arc::new(Unattachable),
            &config,
        );

        assert!(view.play_packed("/a.mov", Some(30)).is_err());
        assert!(view.shared.engine().is_none());
        assert_eq!(view.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_inactive_play_never_advances_under_internal_pacing() {
        let mut config = PlayerConfig::default();
        config.playback.display_refresh_hz = 240;
        config.advanced.stats_interval_secs = 0;
        let renderer = Arc::new(CountingRenderer::default());
        let delegate = Arc::new(CountingDelegate::default());
        let view = PlaybackView::new(
            renderer.clone(),
            Arc::new(ImmediateDispatcher),
            Arc::new(Endless),
            &config,
        );
        view.set_delegate(delegate.clone());
        view.shared.handle_lifecycle(LifecycleEvent::WillResignActive);

        for _ in 0..20 {
            view.play_packed("/a.mov", Some(240)).unwrap();
            assert_eq!(view.state(), PlaybackState::Paused);
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(delegate.advanced.load(Ordering::Acquire), 0);
        assert_eq!(renderer.composites.load(Ordering::Acquire), 0);
    }
}
