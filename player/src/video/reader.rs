//! Sequential decoded-sample reader for one media asset
//!
//! A [`StreamReader`] wraps a [`DecoderBackend`] session and hands out
//! planar image buffers one at a time. It reads one sample ahead so the
//! end of the stream is known as soon as the last buffer is handed out.

use common::{ImageBuffer, MediaAsset, MediaError, PixelLayout, ReaderStatus};
use std::sync::Arc;

/// Opens decode sessions for media assets.
pub trait DecoderBackend: Send + Sync {
    /// Start decoding `asset` into buffers of the given layout.
    ///
    /// Fails with [`MediaError::CannotAttachOutput`] when the container has
    /// no stream that can be decoded into `layout`.
    fn open_session(
        &self,
        asset: &MediaAsset,
        layout: PixelLayout,
    ) -> Result<Box<dyn DecodeSession>, MediaError>;
}

/// One pass over a decoded stream.
pub trait DecodeSession: Send {
    /// Next decoded buffer, `Ok(None)` at end of stream. May block.
    fn next_sample(&mut self) -> Result<Option<ImageBuffer>, MediaError>;

    /// Stop decoding and release decoder resources. Must be idempotent.
    fn cancel(&mut self);
}

pub struct StreamReader {
    asset: MediaAsset,
    layout: PixelLayout,
    backend: Arc<dyn DecoderBackend>,
    session: Option<Box<dyn DecodeSession>>,
    lookahead: Option<ImageBuffer>,
    status: ReaderStatus,
    failure: Option<MediaError>,
}

impl StreamReader {
    pub fn new(asset: MediaAsset, layout: PixelLayout, backend: Arc<dyn DecoderBackend>) -> Self {
        Self {
            asset,
            layout,
            backend,
            session: None,
            lookahead: None,
            status: ReaderStatus::Idle,
            failure: None,
        }
    }

    pub fn status(&self) -> ReaderStatus {
        self.status
    }

    /// Start a fresh decode session, closing any previous one first.
    pub fn reset(&mut self) -> Result<(), MediaError> {
        self.close_session();
        self.lookahead = None;
        self.failure = None;
        self.status = ReaderStatus::Idle;

        let session = match self.backend.open_session(&self.asset, self.layout) {
            Ok(session) => session,
            Err(e) => {
                log::error!("Cannot start reading {}: {}", self.asset, e);
                self.status = ReaderStatus::Failed;
                return Err(e);
            }
        };

        self.session = Some(session);
        self.status = ReaderStatus::Reading;
        log::debug!("Reader started for {}", self.asset);

        self.prefetch();
        Ok(())
    }

    /// Hand out the next decoded buffer.
    ///
    /// A decoder failure is reported before anything else. A reader that
    /// has handed out its last buffer reports exhaustion; any other reader
    /// that is not reading reports its status.
    pub fn copy_next_image_buffer(&mut self) -> Result<ImageBuffer, MediaError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        match self.status {
            ReaderStatus::Reading => {}
            ReaderStatus::Completed => return Err(MediaError::ReaderExhausted),
            status => return Err(MediaError::ReaderNotActive(status)),
        }

        match self.lookahead.take() {
            Some(buffer) => {
                self.prefetch();
                Ok(buffer)
            }
            None => {
                self.finish_stream();
                Err(MediaError::ReaderExhausted)
            }
        }
    }

    /// Stop reading; safe to call any number of times.
    pub fn cancel_reading(&mut self) {
        self.close_session();
        self.lookahead = None;
        if self.status == ReaderStatus::Reading {
            self.status = ReaderStatus::Cancelled;
            log::debug!("Reader cancelled for {}", self.asset);
        }
    }

    fn prefetch(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.next_sample() {
            Ok(Some(buffer)) => {
                if buffer.layout != self.layout {
                    self.fail(MediaError::UnsupportedFormat(format!(
                        "{:?} from {} (expected {:?})",
                        buffer.layout, self.asset, self.layout
                    )));
                } else {
                    self.lookahead = Some(buffer);
                }
            }
            Ok(None) => self.finish_stream(),
            Err(e) => self.fail(e),
        }
    }

    fn finish_stream(&mut self) {
        log::debug!("Reader reached end of {}", self.asset);
        self.status = ReaderStatus::Completed;
        self.close_session();
    }

    fn fail(&mut self, err: MediaError) {
        log::error!("Reader for {} failed: {}", self.asset, err);
        self.status = ReaderStatus::Failed;
        self.failure = Some(err);
        self.close_session();
    }

    fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.cancel();
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.close_session();
    }
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("asset", &self.asset)
            .field("layout", &self.layout)
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use common::{Colorimetry, Plane};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn test_buffer(layout: PixelLayout, marker: u8) -> ImageBuffer {
        let (width, height) = (4, 4);
        let planes = (0..layout.plane_count())
            .map(|i| {
                let (w, h) = layout.plane_size(i, width, height);
                let stride = w as usize * layout.bytes_per_texel(i);
                Plane {
                    data: vec![marker; stride * h as usize],
                    stride,
                    width: w,
                    height: h,
                }
            })
            .collect();
        ImageBuffer {
            layout,
            width,
            height,
            planes,
            colorimetry: Colorimetry::default(),
            pts_ns: None,
        }
    }

    /// Serves `frames` buffers per session, optionally failing at one index.
    pub(crate) struct CountingBackend {
        pub frames: usize,
        pub fail_at: Option<usize>,
        pub attach_fails: bool,
        pub opened: AtomicUsize,
        pub live: Arc<AtomicUsize>,
        pub cancelled: Arc<Mutex<usize>>,
    }

    impl CountingBackend {
        pub(crate) fn new(frames: usize) -> Self {
            Self {
                frames,
                fail_at: None,
                attach_fails: false,
                opened: AtomicUsize::new(0),
                live: Arc::new(AtomicUsize::new(0)),
                cancelled: Arc::new(Mutex::new(0)),
            }
        }
    }

    struct CountingSession {
        layout: PixelLayout,
        produced: usize,
        frames: usize,
        fail_at: Option<usize>,
        live: Arc<AtomicUsize>,
        cancelled: Arc<Mutex<usize>>,
        closed: bool,
    }

    impl DecodeSession for CountingSession {
        fn next_sample(&mut self) -> Result<Option<ImageBuffer>, MediaError> {
            if self.fail_at == Some(self.produced) {
                return Err(MediaError::Decode("corrupt sample".into()));
            }
            if self.produced >= self.frames {
                return Ok(None);
            }
            self.produced += 1;
            Ok(Some(test_buffer(self.layout, self.produced as u8)))
        }

        fn cancel(&mut self) {
            if !self.closed {
                self.closed = true;
                self.live.fetch_sub(1, Ordering::SeqCst);
                *self.cancelled.lock().unwrap() += 1;
            }
        }
    }

    impl DecoderBackend for CountingBackend {
        fn open_session(
            &self,
            asset: &MediaAsset,
            layout: PixelLayout,
        ) -> Result<Box<dyn DecodeSession>, MediaError> {
            if self.attach_fails {
                return Err(MediaError::CannotAttachOutput(asset.to_string()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingSession {
                layout,
                produced: 0,
                frames: self.frames,
                fail_at: self.fail_at,
                live: Arc::clone(&self.live),
                cancelled: Arc::clone(&self.cancelled),
                closed: false,
            }))
        }
    }

    fn reader(backend: Arc<CountingBackend>) -> StreamReader {
        StreamReader::new(MediaAsset::new("/clip.mp4"), PixelLayout::Nv12, backend)
    }

    #[test]
    fn test_copy_before_reset_is_not_active() {
        let mut reader = reader(Arc::new(CountingBackend::new(3)));
        assert_eq!(
            reader.copy_next_image_buffer(),
            Err(MediaError::ReaderNotActive(ReaderStatus::Idle))
        );
    }

    #[test]
    fn test_reads_until_completed() {
        let mut reader = reader(Arc::new(CountingBackend::new(3)));
        reader.reset().unwrap();
        assert_eq!(reader.status(), ReaderStatus::Reading);

        for expected in 1..=3u8 {
            let buffer = reader.copy_next_image_buffer().unwrap();
            assert_eq!(buffer.planes[0].data[0], expected);
        }
        // The last buffer was handed out, so the end is already known
        assert_eq!(reader.status(), ReaderStatus::Completed);
        assert_eq!(
            reader.copy_next_image_buffer(),
            Err(MediaError::ReaderExhausted)
        );
    }

    #[test]
    fn test_empty_stream_completes_on_reset() {
        let mut reader = reader(Arc::new(CountingBackend::new(0)));
        reader.reset().unwrap();
        assert_eq!(reader.status(), ReaderStatus::Completed);
        assert_eq!(
            reader.copy_next_image_buffer(),
            Err(MediaError::ReaderExhausted)
        );
    }

    #[test]
    fn test_attach_failure() {
        let mut backend = CountingBackend::new(3);
        backend.attach_fails = true;
        let mut reader = reader(Arc::new(backend));
        assert!(matches!(
            reader.reset(),
            Err(MediaError::CannotAttachOutput(_))
        ));
        assert_eq!(reader.status(), ReaderStatus::Failed);
    }

    #[test]
    fn test_decode_error_reported_first() {
        let mut backend = CountingBackend::new(5);
        backend.fail_at = Some(2);
        let mut reader = reader(Arc::new(backend));
        reader.reset().unwrap();

        assert!(reader.copy_next_image_buffer().is_ok());
        assert!(reader.copy_next_image_buffer().is_ok());
        assert_eq!(reader.status(), ReaderStatus::Failed);
        assert_eq!(
            reader.copy_next_image_buffer(),
            Err(MediaError::Decode("corrupt sample".into()))
        );
    }

    #[test]
    fn test_reset_closes_previous_session() {
        let backend = Arc::new(CountingBackend::new(10));
        let mut reader = reader(Arc::clone(&backend));

        for _ in 0..5 {
            reader.reset().unwrap();
            reader.copy_next_image_buffer().unwrap();
            assert_eq!(backend.live.load(Ordering::SeqCst), 1);
        }
        assert_eq!(backend.opened.load(Ordering::SeqCst), 5);
        assert_eq!(*backend.cancelled.lock().unwrap(), 4);

        // Reset restarts from the first sample
        reader.reset().unwrap();
        assert_eq!(reader.copy_next_image_buffer().unwrap().planes[0].data[0], 1);
    }

    #[test]
    fn test_cancel_is_idempotent_and_terminal() {
        let backend = Arc::new(CountingBackend::new(10));
        let mut reader = reader(Arc::clone(&backend));
        reader.reset().unwrap();

        reader.cancel_reading();
        reader.cancel_reading();
        assert_eq!(reader.status(), ReaderStatus::Cancelled);
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
        assert_eq!(*backend.cancelled.lock().unwrap(), 1);
        assert_eq!(
            reader.copy_next_image_buffer(),
            Err(MediaError::ReaderNotActive(ReaderStatus::Cancelled))
        );
    }

    #[test]
    fn test_cancel_keeps_completed_status() {
        let mut reader = reader(Arc::new(CountingBackend::new(1)));
        reader.reset().unwrap();
        reader.copy_next_image_buffer().unwrap();
        reader.cancel_reading();
        assert_eq!(reader.status(), ReaderStatus::Completed);
    }

    #[test]
    fn test_drop_releases_session() {
        let backend = Arc::new(CountingBackend::new(10));
        {
            let mut reader = reader(Arc::clone(&backend));
            reader.reset().unwrap();
        }
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
    }
}
