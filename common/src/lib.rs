//! Common types for alphaplay.
//!
//! This crate defines the data model shared by the decode side and the
//! render side of the player: where the media comes from ([`SourceSpec`]),
//! what a decoded picture looks like ([`ImageBuffer`]), what one tick of
//! playback produces ([`Frame`]) and how things fail ([`MediaError`],
//! [`PlaybackError`]).
//!
//! # Examples
//!
//! ```
//! use common::{MediaAsset, SourceSpec};
//!
//! // A color stream with a matte stream alongside it
//! let spec = SourceSpec::separate_alpha("/tmp/sprite.mp4", "/tmp/sprite_alpha.mp4");
//! assert_eq!(spec.assets().len(), 2);
//!
//! // A single stream carrying its own alpha plane
//! let spec = SourceSpec::PackedAlpha {
//!     asset: MediaAsset::new("/tmp/sprite.webm"),
//! };
//! assert_eq!(spec.assets().len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised on the decode path.
///
/// These travel from a stream reader up through the frame source to the
/// playback engine, which ends the session when it sees one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Cannot attach a decode output to {0}")]
    CannotAttachOutput(String),

    #[error("Reader is not active (status: {0})")]
    ReaderNotActive(ReaderStatus),

    #[error("Reader has no more samples")]
    ReaderExhausted,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Timed out waiting for a sample from {0}")]
    Timeout(String),

    #[error("Unsupported pixel layout: {0}")]
    UnsupportedFormat(String),

    #[error("Decoder unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced synchronously to callers of the playback control API.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Playback engine has shut down")]
    EngineStopped,

    #[error("Another play request is already in progress")]
    PlayInProgress,

    #[error("Failed to spawn decode thread: {0}")]
    Spawn(String),
}

/// One decodable container, identified by its location on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaAsset {
    location: PathBuf,
}

impl MediaAsset {
    /// Create an asset from a path or a `file://` URL.
    pub fn new(location: impl AsRef<Path>) -> Self {
        let location = location.as_ref();
        let location = match location.to_str().and_then(|s| s.strip_prefix("file://")) {
            Some(stripped) => PathBuf::from(stripped),
            None => location.to_path_buf(),
        };
        Self { location }
    }

    pub fn path(&self) -> &Path {
        &self.location
    }
}

impl fmt::Display for MediaAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location.display())
    }
}

/// Where the color and alpha of a playback come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceSpec {
    /// Color (luma + chroma) in one container, the matte in another.
    SeparateAlpha { color: MediaAsset, alpha: MediaAsset },
    /// One container whose decoded buffers carry alpha in their 3rd plane.
    PackedAlpha { asset: MediaAsset },
}

impl SourceSpec {
    pub fn separate_alpha(color: impl AsRef<Path>, alpha: impl AsRef<Path>) -> Self {
        Self::SeparateAlpha {
            color: MediaAsset::new(color),
            alpha: MediaAsset::new(alpha),
        }
    }

    pub fn packed_alpha(asset: impl AsRef<Path>) -> Self {
        Self::PackedAlpha {
            asset: MediaAsset::new(asset),
        }
    }

    /// Assets in read order (color before alpha).
    pub fn assets(&self) -> Vec<&MediaAsset> {
        match self {
            Self::SeparateAlpha { color, alpha } => vec![color, alpha],
            Self::PackedAlpha { asset } => vec![asset],
        }
    }
}

/// Lifecycle of one stream reader's decode session.
///
/// Within a session the status only moves forward:
/// `Idle -> Reading -> {Completed | Failed | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReaderStatus {
    Idle,
    Reading,
    Completed,
    Failed,
    Cancelled,
}

impl ReaderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ReaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Reading => "reading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Playback engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Finished,
    Purged,
}

impl PlaybackState {
    /// Finished and Purged sessions ignore pause/resume.
    pub fn is_over(self) -> bool {
        matches!(self, Self::Finished | Self::Purged)
    }
}

/// Memory layout of a decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelLayout {
    /// Two planes: Y, interleaved CbCr at half resolution.
    Nv12,
    /// Three planes: Y, interleaved CbCr at half resolution, full resolution alpha.
    Av12,
}

impl PixelLayout {
    pub fn plane_count(self) -> usize {
        match self {
            Self::Nv12 => 2,
            Self::Av12 => 3,
        }
    }

    /// Bytes per texel of the given plane.
    pub fn bytes_per_texel(self, plane: usize) -> usize {
        match plane {
            1 => 2,
            _ => 1,
        }
    }

    /// Dimensions of the given plane for a picture of `width` x `height`.
    pub fn plane_size(self, plane: usize, width: u32, height: u32) -> (u32, u32) {
        match plane {
            1 => (width.div_ceil(2), height.div_ceil(2)),
            _ => (width, height),
        }
    }
}

/// YCbCr to RGB matrix coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorMatrix {
    Bt601,
    #[default]
    Bt709,
    Bt2020,
}

impl ColorMatrix {
    /// Luma weights (Kr, Kb) of the matrix.
    pub fn luma_weights(self) -> (f32, f32) {
        match self {
            Self::Bt601 => (0.299, 0.114),
            Self::Bt709 => (0.2126, 0.0722),
            Self::Bt2020 => (0.2627, 0.0593),
        }
    }
}

/// Quantization range of the YCbCr samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorRange {
    /// 16..=235 luma, 16..=240 chroma.
    #[default]
    Limited,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Colorimetry {
    pub matrix: ColorMatrix,
    pub range: ColorRange,
}

/// One plane of a planar picture.
#[derive(Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes between the starts of consecutive rows.
    pub stride: usize,
    pub width: u32,
    pub height: u32,
}

impl Plane {
    /// Smallest buffer length that holds `height` rows of `row_bytes` at `stride`.
    pub fn required_len(&self, row_bytes: usize) -> usize {
        if self.height == 0 {
            return 0;
        }
        self.stride * (self.height as usize - 1) + row_bytes
    }
}

impl fmt::Debug for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plane")
            .field("len", &self.data.len())
            .field("stride", &self.stride)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// A decoded planar picture.
///
/// Plane bytes are owned copies; the decoder's pooled buffer has already
/// been returned by the time an `ImageBuffer` exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    pub layout: PixelLayout,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Plane>,
    pub colorimetry: Colorimetry,
    /// Presentation timestamp in nanoseconds, when the decoder knows it.
    pub pts_ns: Option<u64>,
}

impl ImageBuffer {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.planes.get(index)
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }
}

/// Which composite program a frame needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    SeparateAlpha,
    PackedAlpha,
}

/// What one playback tick produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    SeparateAlpha { color: ImageBuffer, alpha: ImageBuffer },
    /// Luma, chroma and alpha co-located in one buffer, alpha in plane 2.
    PackedAlpha(ImageBuffer),
}

impl Frame {
    /// Pixel dimensions of the composited output.
    pub fn size(&self) -> (u32, u32) {
        match self {
            Self::SeparateAlpha { color, .. } => color.size(),
            Self::PackedAlpha(buffer) => buffer.size(),
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Self::SeparateAlpha { .. } => FrameKind::SeparateAlpha,
            Self::PackedAlpha(_) => FrameKind::PackedAlpha,
        }
    }

    /// The buffer holding luma and chroma.
    pub fn color(&self) -> &ImageBuffer {
        match self {
            Self::SeparateAlpha { color, .. } => color,
            Self::PackedAlpha(buffer) => buffer,
        }
    }

    /// The buffer and plane index holding alpha.
    pub fn alpha(&self) -> (&ImageBuffer, usize) {
        match self {
            Self::SeparateAlpha { alpha, .. } => (alpha, 0),
            Self::PackedAlpha(buffer) => (buffer, 2),
        }
    }
}
