//! Shared fixtures for the integration tests: an in-memory decoder and
//! observers that record everything into one ordered channel.
#![allow(dead_code)]

use alphaplay::{
    Colorimetry, DecodeSession, DecoderBackend, Frame, FrameRenderer, ImageBuffer, MediaAsset,
    MediaError, PixelLayout, Plane, PlaybackDelegate,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);
pub const QUIET: Duration = Duration::from_millis(150);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A planar buffer filled with constant sample values
pub fn solid_buffer(
    layout: PixelLayout,
    width: u32,
    height: u32,
    luma: u8,
    chroma: [u8; 2],
    alpha: u8,
) -> ImageBuffer {
    let planes = (0..layout.plane_count())
        .map(|i| {
            let (w, h) = layout.plane_size(i, width, height);
            let stride = w as usize * layout.bytes_per_texel(i);
            let data = match i {
                0 => vec![luma; stride * h as usize],
                1 => chroma.repeat(w as usize * h as usize),
                _ => vec![alpha; stride * h as usize],
            };
            Plane {
                data,
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

/// Identifies a decoded buffer: `tag * 1000 + frame number`
pub fn marker_of(buffer: &ImageBuffer) -> u64 {
    buffer.pts_ns.unwrap_or(0)
}

#[derive(Debug, Clone, Copy)]
pub struct FakeStream {
    pub frames: usize,
    pub fail_at: Option<usize>,
    pub attach_fails: bool,
    pub tag: u64,
}

impl FakeStream {
    pub fn new(frames: usize) -> Self {
        Self {
            frames,
            fail_at: None,
            attach_fails: false,
            tag: 0,
        }
    }

    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn unattachable(mut self) -> Self {
        self.attach_fails = true;
        self
    }

    pub fn tagged(mut self, tag: u64) -> Self {
        self.tag = tag;
        self
    }
}

/// Decoder serving synthetic streams keyed by path
#[derive(Default)]
pub struct FakeDecoder {
    streams: HashMap<PathBuf, FakeStream>,
    opened: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, path: &str, stream: FakeStream) -> Self {
        self.streams.insert(PathBuf::from(path), stream);
        self
    }

    /// Sessions opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet cancelled
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl DecoderBackend for FakeDecoder {
    fn open_session(
        &self,
        asset: &MediaAsset,
        layout: PixelLayout,
    ) -> Result<Box<dyn DecodeSession>, MediaError> {
        let stream = self
            .streams
            .get(asset.path())
            .copied()
            .ok_or_else(|| MediaError::CannotAttachOutput(asset.to_string()))?;
        if stream.attach_fails {
            return Err(MediaError::CannotAttachOutput(asset.to_string()));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            layout,
            stream,
            produced: 0,
            live: Arc::clone(&self.live),
            closed: false,
        }))
    }
}

struct FakeSession {
    layout: PixelLayout,
    stream: FakeStream,
    produced: usize,
    live: Arc<AtomicUsize>,
    closed: bool,
}

impl DecodeSession for FakeSession {
    fn next_sample(&mut self) -> Result<Option<ImageBuffer>, MediaError> {
        if self.stream.fail_at == Some(self.produced) {
            return Err(MediaError::Decode(format!(
                "corrupt sample {}",
                self.produced + 1
            )));
        }
        if self.produced >= self.stream.frames {
            return Ok(None);
        }
        self.produced += 1;

        let mut buffer = solid_buffer(self.layout, 4, 4, 235, [128, 128], 255);
        buffer.pts_ns = Some(self.stream.tag * 1000 + self.produced as u64);
        Ok(Some(buffer))
    }

    fn cancel(&mut self) {
        if !self.closed {
            self.closed = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Everything a view reports, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Composite(u64),
    Clear,
    Advanced(u64),
    Finished,
    Error(MediaError),
}

/// Renderer and client delegate sharing one event channel
pub struct Recorder {
    events: Mutex<Sender<Event>>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(Self {
                events: Mutex::new(tx),
            }),
            rx,
        )
    }

    fn push(&self, event: Event) {
        let _ = self.events.lock().unwrap().send(event);
    }
}

impl FrameRenderer for Recorder {
    fn composite(&self, frame: Frame) {
        self.push(Event::Composite(marker_of(frame.color())));
    }

    fn clear(&self) {
        self.push(Event::Clear);
    }
}

impl PlaybackDelegate for Recorder {
    fn on_frame_advanced(&self, index: u64) {
        self.push(Event::Advanced(index));
    }

    fn on_finished(&self) {
        self.push(Event::Finished);
    }

    fn on_error(&self, error: &MediaError) {
        self.push(Event::Error(error.clone()));
    }
}

/// Collect events until `count` have arrived
pub fn take(events: &Receiver<Event>, count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| {
            events
                .recv_timeout(WAIT)
                .unwrap_or_else(|_| panic!("timed out waiting for event {}", i + 1))
        })
        .collect()
}

/// Assert nothing more arrives for a short while
pub fn assert_quiet(events: &Receiver<Event>) {
    if let Ok(event) = events.recv_timeout(QUIET) {
        panic!("unexpected event {:?}", event);
    }
}

/// The events a frame produces: its composite, then its index
pub fn frame_events(marker: u64, index: u64) -> [Event; 2] {
    [Event::Composite(marker), Event::Advanced(index)]
}

/// Poll `condition` until it holds or [`WAIT`] elapses
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
