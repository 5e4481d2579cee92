//! Decode side of the player
//!
//! - `reader`: one asset's decode session behind [`StreamReader`]
//! - `source`: color/alpha lockstep behind [`FrameSource`]
//! - `stats`: decode-thread playback statistics
//! - `pipeline`: the GStreamer [`DecoderBackend`] (`video` feature)
//!
//! # Architecture
//!
//! Readers are driven only from an engine's decode thread:
//! 1. `FrameSource::reset` opens one decode session per asset
//! 2. Each accepted tick pulls one buffer per reader, color before alpha
//! 3. Buffers are owned copies, handed to the frame sink for one tick
//! 4. The first reader to complete ends playback

mod reader;
mod source;
pub mod stats;

#[cfg(feature = "video")]
mod pipeline;

pub use reader::{DecodeSession, DecoderBackend, StreamReader};
pub use source::FrameSource;
pub use stats::PlaybackStats;

#[cfg(feature = "video")]
pub use pipeline::{GstDecoder, initialize_gstreamer};

/// The platform decoder, when compiled in
#[cfg(feature = "video")]
pub fn default_backend(
    config: &crate::config::PlayerConfig,
) -> Option<std::sync::Arc<dyn DecoderBackend>> {
    Some(std::sync::Arc::new(GstDecoder::from_config(config)))
}

/// The platform decoder, when compiled in
#[cfg(not(feature = "video"))]
pub fn default_backend(
    _config: &crate::config::PlayerConfig,
) -> Option<std::sync::Arc<dyn DecoderBackend>> {
    None
}
