//! alphaplay - playback of video with an alpha channel
//!
//! Color and alpha come either from two synchronized streams (the alpha
//! carried in the luma of the second) or from one stream whose decoder
//! outputs a third, alpha plane. Frames are decoded on a per-session
//! thread, paced by a frame clock against display refresh ticks, and
//! composited by the GPU into straight-alpha RGBA on a transparent surface.
//!
//! - [`engine`]: the play/pause/resume/purge state machine and decode thread
//! - [`video`]: stream readers, the frame source and the GStreamer backend
//! - [`gpu`]: the wgpu compositor and its surfaces (`gpu` feature)
//! - [`view`]: the host-facing view tying an engine to a renderer
//! - [`lifecycle`]: host foreground/background events
//! - [`dispatch`]: running work on the host's UI thread
//!
//! ```ignore
//! let config = PlayerConfig::load()?;
//! let context = Arc::new(GpuContext::new_blocking(&config.render)?);
//! let surface = Arc::new(OffscreenSurface::new(context.clone(), surface_format(&config.render)));
//! let ui = Arc::new(UiThread::spawn()?);
//! let compositor = Arc::new(FrameCompositor::new(context, surface, ui.clone(), &config.render)?);
//!
//! let view = PlaybackView::with_default_backend(compositor, ui, &config)?;
//! view.play_separate("color.mp4", "alpha.mp4", Some(30))?;
//! ```

mod macros;

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod engine;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod lifecycle;
pub mod video;
pub mod view;

pub use common::{
    ColorMatrix, ColorRange, Colorimetry, Frame, FrameKind, ImageBuffer, MediaAsset, MediaError,
    PixelLayout, Plane, PlaybackError, PlaybackState, ReaderStatus, SourceSpec,
};

pub use clock::FrameClock;
pub use config::{PacingMode, PlayerConfig};
pub use dispatch::{ImmediateDispatcher, UiDispatcher, UiThread};
pub use engine::{EngineDelegate, EngineOptions, FrameSink, PlaybackEngine};
pub use lifecycle::{LifecycleEvent, LifecycleNotifier, LifecycleObserver};
pub use video::{DecodeSession, DecoderBackend, FrameSource, StreamReader};
pub use view::{FrameRenderer, PlaybackDelegate, PlaybackView};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a panicking thread poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
