//! Lockstep reading of the color and alpha streams

use super::reader::{DecoderBackend, StreamReader};
use common::{Frame, MediaError, PixelLayout, ReaderStatus, SourceSpec};
use std::sync::Arc;

#[derive(Debug)]
enum Readers {
    Separate {
        color: StreamReader,
        alpha: StreamReader,
    },
    Packed(StreamReader),
}

/// Produces composite-ready frames from one or two readers.
#[derive(Debug)]
pub struct FrameSource {
    readers: Readers,
}

impl FrameSource {
    pub fn new(spec: &SourceSpec, backend: Arc<dyn DecoderBackend>) -> Self {
        let readers = match spec {
            SourceSpec::SeparateAlpha { color, alpha } => Readers::Separate {
                color: StreamReader::new(color.clone(), PixelLayout::Nv12, Arc::clone(&backend)),
                alpha: StreamReader::new(alpha.clone(), PixelLayout::Nv12, backend),
            },
            SourceSpec::PackedAlpha { asset } => {
                Readers::Packed(StreamReader::new(asset.clone(), PixelLayout::Av12, backend))
            }
        };
        Self { readers }
    }

    /// Reset every reader in order. The first failure is returned and the
    /// remaining readers are left untouched.
    pub fn reset(&mut self) -> Result<(), MediaError> {
        match &mut self.readers {
            Readers::Separate { color, alpha } => {
                color.reset()?;
                alpha.reset()
            }
            Readers::Packed(reader) => reader.reset(),
        }
    }

    /// True as soon as any reader has completed; the shorter stream ends playback.
    pub fn is_exhausted(&self) -> bool {
        self.statuses().contains(&ReaderStatus::Completed)
    }

    pub fn next_frame(&mut self) -> Result<Frame, MediaError> {
        match &mut self.readers {
            Readers::Separate { color, alpha } => {
                let color = color.copy_next_image_buffer()?;
                let alpha = alpha.copy_next_image_buffer()?;
                Ok(Frame::SeparateAlpha { color, alpha })
            }
            Readers::Packed(reader) => Ok(Frame::PackedAlpha(reader.copy_next_image_buffer()?)),
        }
    }

    pub fn cancel_reading(&mut self) {
        match &mut self.readers {
            Readers::Separate { color, alpha } => {
                color.cancel_reading();
                alpha.cancel_reading();
            }
            Readers::Packed(reader) => reader.cancel_reading(),
        }
    }

    /// Reader statuses in read order.
    pub fn statuses(&self) -> Vec<ReaderStatus> {
        match &self.readers {
            Readers::Separate { color, alpha } => vec![color.status(), alpha.status()],
            Readers::Packed(reader) => vec![reader.status()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::reader::DecodeSession;
    use crate::video::reader::tests::{CountingBackend, test_buffer};
    use common::{FrameKind, ImageBuffer, MediaAsset};
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Per-path frame counts.
    struct PerAssetBackend {
        frames: HashMap<PathBuf, usize>,
    }

    struct FixedSession {
        layout: PixelLayout,
        remaining: usize,
    }

    impl DecodeSession for FixedSession {
        fn next_sample(&mut self) -> Result<Option<ImageBuffer>, MediaError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(test_buffer(self.layout, 0)))
        }

        fn cancel(&mut self) {}
    }

    impl DecoderBackend for PerAssetBackend {
        fn open_session(
            &self,
            asset: &MediaAsset,
            layout: PixelLayout,
        ) -> Result<Box<dyn DecodeSession>, MediaError> {
            let remaining = *self
                .frames
                .get(asset.path())
                .ok_or_else(|| MediaError::CannotAttachOutput(asset.to_string()))?;
            Ok(Box::new(FixedSession { layout, remaining }))
        }
    }

    fn separate(color: usize, alpha: usize) -> FrameSource {
        let backend = PerAssetBackend {
            frames: HashMap::from([
                (PathBuf::from("/color.mp4"), color),
                (PathBuf::from("/alpha.mp4"), alpha),
            ]),
        };
        FrameSource::new(
            &SourceSpec::separate_alpha("/color.mp4", "/alpha.mp4"),
            Arc::new(backend),
        )
    }

    #[test]
    fn test_shorter_stream_wins() {
        let mut source = separate(5, 8);
        source.reset().unwrap();

        let mut produced = 0;
        while !source.is_exhausted() {
            source.next_frame().unwrap();
            produced += 1;
        }
        assert_eq!(produced, 5);
        assert_eq!(
            source.statuses(),
            vec![ReaderStatus::Completed, ReaderStatus::Reading]
        );
    }

    #[test]
    fn test_alpha_shorter_than_color() {
        let mut source = separate(8, 3);
        source.reset().unwrap();

        let mut produced = 0;
        while !source.is_exhausted() {
            source.next_frame().unwrap();
            produced += 1;
        }
        assert_eq!(produced, 3);
    }

    #[test]
    fn test_separate_frames_pair_color_and_alpha() {
        let mut source = separate(2, 2);
        source.reset().unwrap();
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.kind(), FrameKind::SeparateAlpha);
        assert_eq!(frame.color().layout, PixelLayout::Nv12);
    }

    #[test]
    fn test_packed_source_uses_alpha_layout() {
        let mut source = FrameSource::new(
            &SourceSpec::packed_alpha("/packed.mov"),
            Arc::new(CountingBackend::new(2)),
        );
        source.reset().unwrap();
        match source.next_frame().unwrap() {
            Frame::PackedAlpha(buffer) => {
                assert_eq!(buffer.layout, PixelLayout::Av12);
                assert_eq!(buffer.plane_count(), 3);
            }
            other => panic!("unexpected frame {:?}", other.kind()),
        }
    }

    #[test]
    fn test_reset_failure_leaves_later_readers() {
        let backend = PerAssetBackend {
            frames: HashMap::from([(PathBuf::from("/alpha.mp4"), 3)]),
        };
        let mut source = FrameSource::new(
            &SourceSpec::separate_alpha("/missing.mp4", "/alpha.mp4"),
            Arc::new(backend),
        );
        assert!(matches!(
            source.reset(),
            Err(MediaError::CannotAttachOutput(_))
        ));
        assert_eq!(
            source.statuses(),
            vec![ReaderStatus::Failed, ReaderStatus::Idle]
        );
    }

    #[test]
    fn test_next_frame_before_reset_fails() {
        let mut source = separate(1, 1);
        assert_eq!(
            source.next_frame(),
            Err(MediaError::ReaderNotActive(ReaderStatus::Idle))
        );
    }

    #[test]
    fn test_cancel_reading() {
        let mut source = separate(4, 4);
        source.reset().unwrap();
        source.cancel_reading();
        assert_eq!(
            source.statuses(),
            vec![ReaderStatus::Cancelled, ReaderStatus::Cancelled]
        );
        assert!(!source.is_exhausted());
    }
}
