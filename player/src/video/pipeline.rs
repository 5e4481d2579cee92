//! GStreamer decode backend
//!
//! Each session runs `filesrc ! decodebin ! videoconvert ! appsink` with the
//! appsink constrained to the planar layout the compositor samples from:
//! NV12 for separate color/alpha streams, AV12 (NV12 plus a full-resolution
//! alpha plane) for packed-alpha streams. Samples are pulled synchronously
//! from the decode thread and copied out so the pooled decoder buffer goes
//! straight back to GStreamer.

use super::reader::{DecodeSession, DecoderBackend};
use crate::config::PlayerConfig;
use common::{
    ColorMatrix, ColorRange, Colorimetry, ImageBuffer, MediaAsset, MediaError, PixelLayout, Plane,
};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::sync::OnceLock;
use std::time::Duration;

/// Decoded samples buffered in the appsink before upstream blocks
const MAX_QUEUED_SAMPLES: u32 = 4;

/// How long to wait for the pipeline to reach Null on teardown
const TEARDOWN_TIMEOUT_SECS: u64 = 2;

/// Initialize GStreamer (idempotent, safe to call multiple times)
pub fn initialize_gstreamer() -> Result<(), MediaError> {
    static GSTREAMER_INITIALIZED: OnceLock<Result<(), String>> = OnceLock::new();

    GSTREAMER_INITIALIZED
        .get_or_init(|| {
            let result = gst::init().map_err(|e| e.to_string());
            if result.is_ok() {
                log::info!("GStreamer initialized");
            }
            result
        })
        .clone()
        .map_err(MediaError::Unavailable)
}

/// Appsink caps for a pixel layout
fn layout_caps(layout: PixelLayout) -> gst::Caps {
    let format = match layout {
        PixelLayout::Nv12 => "NV12",
        PixelLayout::Av12 => "AV12",
    };
    gst::Caps::builder("video/x-raw")
        .field("format", format)
        .build()
}

fn make_element(factory_name: &str) -> Result<gst::Element, MediaError> {
    gst::ElementFactory::make(factory_name)
        .build()
        .map_err(|e| MediaError::Unavailable(format!("Failed to create {factory_name}: {e}")))
}

/// Link the first video pad decodebin exposes to `videoconvert`
fn connect_video_pad(decodebin: &gst::Element, videoconvert: &gst::Element) {
    let videoconvert_weak = videoconvert.downgrade();
    decodebin.connect_pad_added(move |_dbin, src_pad| {
        let caps = match src_pad.current_caps() {
            Some(c) => c,
            None => src_pad.query_caps(None),
        };
        let Some(structure) = caps.structure(0) else {
            return;
        };
        if !structure.name().as_str().starts_with("video/") {
            return;
        }
        let Some(sink_pad) = videoconvert_weak
            .upgrade()
            .and_then(|vc| vc.static_pad("sink"))
        else {
            return;
        };
        if !sink_pad.is_linked() {
            if let Err(e) = src_pad.link(&sink_pad) {
                log::warn!("Failed to link decoded video pad: {:?}", e);
            }
        }
    });
}

/// Wait for preroll to finish, surfacing the first bus error
fn wait_for_async_done(bus: &gst::Bus, timeout: gst::ClockTime) -> Result<(), String> {
    loop {
        let Some(msg) = bus.timed_pop(timeout) else {
            return Err("timed out waiting for preroll".to_string());
        };
        match msg.view() {
            gst::MessageView::AsyncDone(_) => return Ok(()),
            gst::MessageView::Error(err) => {
                return Err(format!("{}", err.error()));
            }
            _ => {}
        }
    }
}

fn shutdown_pipeline(pipeline: &gst::Pipeline) {
    match pipeline.set_state(gst::State::Null) {
        Ok(_) => {
            let (result, current, _pending) =
                pipeline.state(Some(gst::ClockTime::from_seconds(TEARDOWN_TIMEOUT_SECS)));
            if let Err(e) = result {
                log::warn!("Pipeline did not reach Null (now {:?}): {:?}", current, e);
            }
        }
        Err(e) => log::warn!("Failed to stop pipeline: {:?}", e),
    }
}

/// Decoder backend built on GStreamer's automatic demux/decode
#[derive(Debug, Clone)]
pub struct GstDecoder {
    timeout: Duration,
}

impl GstDecoder {
    /// `timeout` bounds preroll and each sample pull
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::new(config.decode_timeout())
    }

    fn clock_timeout(&self) -> gst::ClockTime {
        gst::ClockTime::from_nseconds(self.timeout.as_nanos().min(u64::MAX as u128) as u64)
    }
}

impl Default for GstDecoder {
    fn default() -> Self {
        Self::from_config(&PlayerConfig::default())
    }
}

impl DecoderBackend for GstDecoder {
    fn open_session(
        &self,
        asset: &MediaAsset,
        layout: PixelLayout,
    ) -> Result<Box<dyn DecodeSession>, MediaError> {
        initialize_gstreamer()?;

        let name = asset.to_string();
        log::debug!("Creating {:?} decode pipeline for {}", layout, name);

        let attach_error = |reason: String| MediaError::CannotAttachOutput(format!("{name}: {reason}"));

        if !asset.path().exists() {
            return Err(attach_error("file not found".into()));
        }

        let pipeline = gst::Pipeline::new();
        let filesrc = gst::ElementFactory::make("filesrc")
            .property("location", asset.path().to_string_lossy().as_ref())
            .build()
            .map_err(|e| MediaError::Unavailable(format!("Failed to create filesrc: {e}")))?;
        let decodebin = make_element("decodebin")?;
        let videoconvert = make_element("videoconvert")?;

        let app_sink = gst_app::AppSink::builder()
            .caps(&layout_caps(layout))
            .sync(false)
            .max_buffers(MAX_QUEUED_SAMPLES)
            .build();

        pipeline
            .add_many([
                &filesrc,
                &decodebin,
                &videoconvert,
                app_sink.upcast_ref::<gst::Element>(),
            ])
            .map_err(|e| attach_error(e.to_string()))?;
        gst::Element::link_many([&filesrc, &decodebin]).map_err(|e| attach_error(e.to_string()))?;
        gst::Element::link_many([&videoconvert, app_sink.upcast_ref::<gst::Element>()])
            .map_err(|e| attach_error(e.to_string()))?;

        connect_video_pad(&decodebin, &videoconvert);

        // Preroll so a missing track or a caps mismatch fails here, not mid-playback
        if let Err(e) = pipeline.set_state(gst::State::Paused) {
            shutdown_pipeline(&pipeline);
            return Err(attach_error(format!("{e:?}")));
        }

        let Some(bus) = pipeline.bus() else {
            shutdown_pipeline(&pipeline);
            return Err(attach_error("pipeline has no bus".into()));
        };

        if let Err(e) = wait_for_async_done(&bus, self.clock_timeout()) {
            shutdown_pipeline(&pipeline);
            return Err(attach_error(e));
        }

        let linked = videoconvert
            .static_pad("sink")
            .is_some_and(|pad| pad.is_linked());
        if !linked {
            shutdown_pipeline(&pipeline);
            return Err(attach_error("no video track".into()));
        }

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            shutdown_pipeline(&pipeline);
            return Err(attach_error(format!("{e:?}")));
        }

        log::info!("Decode session started for {} ({:?})", name, layout);

        Ok(Box::new(GstSession {
            pipeline,
            app_sink,
            bus,
            layout,
            name,
            timeout: self.clock_timeout(),
            stopped: false,
        }))
    }
}

struct GstSession {
    pipeline: gst::Pipeline,
    app_sink: gst_app::AppSink,
    bus: gst::Bus,
    layout: PixelLayout,
    name: String,
    timeout: gst::ClockTime,
    stopped: bool,
}

impl GstSession {
    fn pending_error(&self) -> Option<MediaError> {
        let msg = self.bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(MediaError::Decode(format!(
                "{}: {}",
                self.name,
                err.error()
            ))),
            _ => None,
        }
    }

    fn copy_sample(&self, sample: &gst::Sample) -> Result<ImageBuffer, MediaError> {
        let caps = sample
            .caps()
            .ok_or_else(|| MediaError::Decode(format!("{}: sample has no caps", self.name)))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| MediaError::UnsupportedFormat(format!("{}: {e}", self.name)))?;

        if info.n_planes() as usize != self.layout.plane_count() {
            return Err(MediaError::UnsupportedFormat(format!(
                "{}: {} planes, expected {:?}",
                self.name,
                info.n_planes(),
                self.layout
            )));
        }

        let buffer = sample
            .buffer()
            .ok_or_else(|| MediaError::Decode(format!("{}: sample has no buffer", self.name)))?;
        let frame = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, &info)
            .map_err(|e| MediaError::Decode(format!("{}: {e}", self.name)))?;

        let (width, height) = (info.width(), info.height());
        let strides = frame.plane_stride();
        let mut planes = Vec::with_capacity(self.layout.plane_count());

        for index in 0..self.layout.plane_count() {
            let (plane_width, plane_height) = self.layout.plane_size(index, width, height);
            let stride = strides.get(index).copied().unwrap_or_default().max(0) as usize;
            let data = frame
                .plane_data(index as u32)
                .map_err(|e| MediaError::Decode(format!("{}: {e}", self.name)))?;
            let len = (stride * plane_height as usize).min(data.len());

            planes.push(Plane {
                data: data[..len].to_vec(),
                stride,
                width: plane_width,
                height: plane_height,
            });
        }

        Ok(ImageBuffer {
            layout: self.layout,
            width,
            height,
            planes,
            colorimetry: colorimetry_from_info(&info),
            pts_ns: buffer.pts().map(|pts| pts.nseconds()),
        })
    }
}

fn colorimetry_from_info(info: &gst_video::VideoInfo) -> Colorimetry {
    let colorimetry = info.colorimetry();
    let matrix = match colorimetry.matrix() {
        gst_video::VideoColorMatrix::Bt601 => ColorMatrix::Bt601,
        gst_video::VideoColorMatrix::Bt2020 => ColorMatrix::Bt2020,
        _ => ColorMatrix::Bt709,
    };
    let range = match colorimetry.range() {
        gst_video::VideoColorRange::Range0_255 => ColorRange::Full,
        _ => ColorRange::Limited,
    };
    Colorimetry { matrix, range }
}

impl DecodeSession for GstSession {
    fn next_sample(&mut self) -> Result<Option<ImageBuffer>, MediaError> {
        if self.stopped {
            return Ok(None);
        }

        match self.app_sink.try_pull_sample(self.timeout) {
            Some(sample) => self.copy_sample(&sample).map(Some),
            None if self.app_sink.is_eos() => {
                log::debug!("End of stream: {}", self.name);
                Ok(None)
            }
            None => Err(self
                .pending_error()
                .unwrap_or_else(|| MediaError::Timeout(self.name.clone()))),
        }
    }

    fn cancel(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        log::debug!("Stopping decode session for {}", self.name);
        shutdown_pipeline(&self.pipeline);
    }
}

impl Drop for GstSession {
    fn drop(&mut self) {
        self.cancel();
    }
}
