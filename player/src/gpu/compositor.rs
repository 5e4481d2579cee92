//! Frame compositor
//!
//! Drawables are acquired (and the surface resized) on the UI thread, then
//! handed with their frame to a dedicated render thread. The render thread
//! uploads the three planes, draws one full-screen strip with the program
//! matching the frame layout, and presents. Any render failure falls back
//! to presenting a transparent drawable.

use super::CompositeError;
use super::context::GpuContext;
use super::pipeline_builder::{
    PipelineBuilder, bind_group_entries, create_pipeline_layout, create_shader_module,
};
use super::surface::{Drawable, SurfaceProvider};
use super::texture::PlaneTextureCache;
use crate::config::RenderSettings;
use crate::dispatch::UiDispatcher;
use crate::log_and_continue;
use crate::view::FrameRenderer;
use bytemuck::{Pod, Zeroable};
use common::{ColorMatrix, ColorRange, Frame, FrameKind, Plane};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle, ThreadId};

const SHADER_SOURCE: &str = include_str!("shaders/composite.wgsl");

const SAMPLER_BINDING: u32 = 3;
const UNIFORM_BINDING: u32 = 4;

/// Texture binding a plane is sampled through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneSlot {
    Luma,
    Alpha,
    Chroma,
}

impl PlaneSlot {
    pub fn binding(self) -> u32 {
        match self {
            Self::Luma => 0,
            Self::Alpha => 1,
            Self::Chroma => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Luma => "Luma Plane",
            Self::Alpha => "Alpha Plane",
            Self::Chroma => "Chroma Plane",
        }
    }
}

/// GPU format of a single plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneFormat {
    R8,
    Rg8,
}

impl PlaneFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            Self::R8 => 1,
            Self::Rg8 => 2,
        }
    }

    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            Self::R8 => wgpu::TextureFormat::R8Unorm,
            Self::Rg8 => wgpu::TextureFormat::Rg8Unorm,
        }
    }
}

/// One plane of a frame, bound to its texture slot
#[derive(Debug, Clone, Copy)]
pub struct PlaneBinding<'a> {
    pub slot: PlaneSlot,
    pub plane: &'a Plane,
    pub format: PlaneFormat,
}

/// Resolve the luma, alpha and chroma planes of a frame.
///
/// Both layouts expose the same three planes; they differ only in which
/// buffer carries the alpha luma and at which plane index.
pub fn plane_bindings(frame: &Frame) -> Result<[PlaneBinding<'_>; 3], CompositeError> {
    let color = frame.color();
    let (alpha, alpha_index) = frame.alpha();

    let luma = color.plane(0).ok_or(CompositeError::MissingPlane {
        slot: PlaneSlot::Luma,
        plane: 0,
    })?;
    let chroma = color.plane(1).ok_or(CompositeError::MissingPlane {
        slot: PlaneSlot::Chroma,
        plane: 1,
    })?;
    let alpha = alpha.plane(alpha_index).ok_or(CompositeError::MissingPlane {
        slot: PlaneSlot::Alpha,
        plane: alpha_index,
    })?;

    Ok([
        PlaneBinding {
            slot: PlaneSlot::Luma,
            plane: luma,
            format: PlaneFormat::R8,
        },
        PlaneBinding {
            slot: PlaneSlot::Alpha,
            plane: alpha,
            format: PlaneFormat::R8,
        },
        PlaneBinding {
            slot: PlaneSlot::Chroma,
            plane: chroma,
            format: PlaneFormat::Rg8,
        },
    ])
}

/// The closed set of composite programs, one per frame layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeProgram {
    SeparateAlpha,
    PackedAlpha,
}

impl CompositeProgram {
    pub const ALL: [CompositeProgram; 2] =
        [CompositeProgram::SeparateAlpha, CompositeProgram::PackedAlpha];

    pub fn for_kind(kind: FrameKind) -> Self {
        match kind {
            FrameKind::SeparateAlpha => Self::SeparateAlpha,
            FrameKind::PackedAlpha => Self::PackedAlpha,
        }
    }

    pub fn fragment_entry(self) -> &'static str {
        match self {
            Self::SeparateAlpha => "fs_separate_alpha",
            Self::PackedAlpha => "fs_packed_alpha",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::SeparateAlpha => 0,
            Self::PackedAlpha => 1,
        }
    }
}

/// Uniform block shared by both programs
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompositeUniforms {
    pub color_matrix: [[f32; 4]; 4],
    /// x = offset, y = scale
    pub alpha_range: [f32; 4],
}

impl CompositeUniforms {
    pub fn for_frame(frame: &Frame) -> Self {
        let colorimetry = frame.color().colorimetry;
        let alpha_range = match frame {
            Frame::SeparateAlpha { alpha, .. } => match alpha.colorimetry.range {
                ColorRange::Limited => [16.0 / 255.0, 255.0 / 219.0, 0.0, 0.0],
                ColorRange::Full => [0.0, 1.0, 0.0, 0.0],
            },
            Frame::PackedAlpha(_) => [0.0, 1.0, 0.0, 0.0],
        };

        Self {
            color_matrix: ycbcr_matrix(colorimetry.matrix, colorimetry.range),
            alpha_range,
        }
    }
}

/// Column-major transform taking normalized `(y, cb, cr, 1)` samples to RGB
pub fn ycbcr_matrix(matrix: ColorMatrix, range: ColorRange) -> [[f32; 4]; 4] {
    let (kr, kb) = matrix.luma_weights();
    let kg = 1.0 - kr - kb;

    let (ys, yo, cs) = match range {
        ColorRange::Limited => (255.0 / 219.0, 16.0 / 255.0, 255.0 / 224.0),
        ColorRange::Full => (1.0, 0.0, 1.0),
    };
    let co = 128.0 / 255.0;

    let cr_r = 2.0 * (1.0 - kr) * cs;
    let cb_b = 2.0 * (1.0 - kb) * cs;
    let cb_g = 2.0 * kb * (1.0 - kb) / kg * cs;
    let cr_g = 2.0 * kr * (1.0 - kr) / kg * cs;

    let y0 = -ys * yo;
    [
        [ys, ys, ys, 0.0],
        [0.0, -cb_g, cb_b, 0.0],
        [cr_r, -cr_g, 0.0, 0.0],
        [
            y0 - cr_r * co,
            y0 + (cb_g + cr_g) * co,
            y0 - cb_b * co,
            1.0,
        ],
    ]
}

/// Running counters for one compositor
#[derive(Debug, Default)]
pub struct CompositorStats {
    composites: AtomicU64,
    fallbacks: AtomicU64,
    skipped: AtomicU64,
    clears: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositorStatsSnapshot {
    /// Frames drawn and presented
    pub composites: u64,
    /// Frames replaced by a transparent drawable after a render failure
    pub fallbacks: u64,
    /// Requests dropped because no drawable was available
    pub skipped: u64,
    /// Explicit clears presented
    pub clears: u64,
}

impl CompositorStats {
    pub fn snapshot(&self) -> CompositorStatsSnapshot {
        CompositorStatsSnapshot {
            composites: self.composites.load(Ordering::Acquire),
            fallbacks: self.fallbacks.load(Ordering::Acquire),
            skipped: self.skipped.load(Ordering::Acquire),
            clears: self.clears.load(Ordering::Acquire),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::AcqRel);
    }
}

enum RenderJob {
    Composite {
        frame: Frame,
        drawable: Box<dyn Drawable>,
    },
    Clear {
        drawable: Box<dyn Drawable>,
    },
    Shutdown,
}

/// GPU state owned by the render thread
struct CompositeRenderer {
    context: Arc<GpuContext>,
    format: wgpu::TextureFormat,
    pipelines: [wgpu::RenderPipeline; 2],
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    cache: PlaneTextureCache,
    wait_for_gpu: bool,
    stats: Arc<CompositorStats>,
}

impl CompositeRenderer {
    fn new(
        context: Arc<GpuContext>,
        format: wgpu::TextureFormat,
        wait_for_gpu: bool,
        stats: Arc<CompositorStats>,
    ) -> Self {
        let device = &context.device;
        let shader = create_shader_module(device, "Composite Shader", SHADER_SOURCE);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Composite Bind Group Layout"),
            entries: &[
                bind_group_entries::texture(PlaneSlot::Luma.binding()),
                bind_group_entries::texture(PlaneSlot::Alpha.binding()),
                bind_group_entries::texture(PlaneSlot::Chroma.binding()),
                bind_group_entries::sampler(SAMPLER_BINDING),
                bind_group_entries::uniform_buffer(UNIFORM_BINDING),
            ],
        });
        let layout =
            create_pipeline_layout(device, "Composite Pipeline Layout", &[&bind_group_layout]);

        let pipelines = CompositeProgram::ALL.map(|program| {
            PipelineBuilder::new(device, &shader)
                .with_label(program.fragment_entry())
                .with_layout(&layout)
                .with_format(format)
                .with_fragment_entry(program.fragment_entry())
                .build()
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Plane Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Composite Uniforms"),
            size: std::mem::size_of::<CompositeUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            context,
            format,
            pipelines,
            bind_group_layout,
            sampler,
            uniform_buffer,
            cache: PlaneTextureCache::new(),
            wait_for_gpu,
            stats,
        }
    }

    fn run(mut self, jobs: mpsc::Receiver<RenderJob>) {
        log::debug!("Render thread started");
        while let Ok(job) = jobs.recv() {
            match job {
                RenderJob::Composite { frame, drawable } => self.composite(&frame, drawable),
                RenderJob::Clear { drawable } => {
                    self.clear(drawable.texture());
                    drawable.present();
                    CompositorStats::bump(&self.stats.clears);
                }
                RenderJob::Shutdown => break,
            }
        }
        let (hits, misses) = self.cache.hit_counts();
        log::debug!(
            "Render thread exiting (texture cache: {} hits, {} misses)",
            hits,
            misses
        );
    }

    fn composite(&mut self, frame: &Frame, drawable: Box<dyn Drawable>) {
        #[cfg(feature = "profiling")]
        let started = std::time::Instant::now();

        let drawn = match self.draw(frame, drawable.texture()) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Composite failed, presenting transparent frame: {}", e);
                self.clear(drawable.texture());
                false
            }
        };
        self.cache.flush();
        drawable.present();

        if drawn {
            CompositorStats::bump(&self.stats.composites);
        } else {
            CompositorStats::bump(&self.stats.fallbacks);
        }

        #[cfg(feature = "profiling")]
        log::debug!("Composite took {:?}", started.elapsed());
    }

    fn draw(&mut self, frame: &Frame, target: &wgpu::Texture) -> Result<(), CompositeError> {
        let (width, height) = frame.size();
        if width == 0 || height == 0 {
            return Err(CompositeError::EmptyFrame { width, height });
        }
        let max = self.context.limits.max_texture_dimension_2d;
        if width > max || height > max {
            return Err(CompositeError::FrameTooLarge { width, height, max });
        }
        if target.format() != self.format {
            return Err(CompositeError::FormatMismatch {
                expected: self.format,
                actual: target.format(),
            });
        }

        let device = &self.context.device;
        let queue = &self.context.queue;

        for binding in plane_bindings(frame)? {
            self.cache.upload(device, queue, &binding)?;
        }

        let uniforms = CompositeUniforms::for_frame(frame);
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let view_for = |slot: PlaneSlot| {
            self.cache.view(slot).ok_or(CompositeError::MissingPlane {
                slot,
                plane: slot.binding() as usize,
            })
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: PlaneSlot::Luma.binding(),
                    resource: wgpu::BindingResource::TextureView(view_for(PlaneSlot::Luma)?),
                },
                wgpu::BindGroupEntry {
                    binding: PlaneSlot::Alpha.binding(),
                    resource: wgpu::BindingResource::TextureView(view_for(PlaneSlot::Alpha)?),
                },
                wgpu::BindGroupEntry {
                    binding: PlaneSlot::Chroma.binding(),
                    resource: wgpu::BindingResource::TextureView(view_for(PlaneSlot::Chroma)?),
                },
                wgpu::BindGroupEntry {
                    binding: SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: UNIFORM_BINDING,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let program = CompositeProgram::for_kind(frame.kind());
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Composite Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Composite Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(&self.pipelines[program.index()]);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..4, 0..1);
        }

        self.submit(encoder);
        Ok(())
    }

    /// Clear `target` to fully transparent
    fn clear(&self, target: &wgpu::Texture) {
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Clear Encoder"),
                });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        self.submit(encoder);
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        let submission = self.context.queue.submit(Some(encoder.finish()));
        if self.wait_for_gpu {
            log_and_continue!(
                self.context.device.poll(wgpu::PollType::Wait {
                    submission_index: Some(submission),
                    timeout: None,
                }),
                "wait for GPU completion"
            );
        }
    }
}

/// Composites decoded frames onto a [`SurfaceProvider`].
///
/// Frames are presented in the order `composite` is called. With
/// `render.wait_for_gpu` the render thread waits for each submission to
/// complete before taking the next job.
pub struct FrameCompositor {
    surface: Arc<dyn SurfaceProvider>,
    ui: Arc<dyn UiDispatcher>,
    jobs: mpsc::Sender<RenderJob>,
    closed: Arc<AtomicBool>,
    stats: Arc<CompositorStats>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl FrameCompositor {
    pub fn new(
        context: Arc<GpuContext>,
        surface: Arc<dyn SurfaceProvider>,
        ui: Arc<dyn UiDispatcher>,
        settings: &RenderSettings,
    ) -> anyhow::Result<Self> {
        let format = surface.format();
        let stats = Arc::new(CompositorStats::default());
        let renderer = CompositeRenderer::new(
            context,
            format,
            settings.wait_for_gpu,
            Arc::clone(&stats),
        );

        let (jobs, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("alphaplay-render".into())
            .spawn(move || renderer.run(receiver))?;
        let thread_id = handle.thread().id();

        log::info!(
            "Frame compositor ready ({:?}, wait_for_gpu={})",
            format,
            settings.wait_for_gpu
        );

        Ok(Self {
            surface,
            ui,
            jobs,
            closed: Arc::new(AtomicBool::new(false)),
            stats,
            handle: Some(handle),
            thread_id,
        })
    }

    pub fn stats(&self) -> CompositorStatsSnapshot {
        self.stats.snapshot()
    }

    /// Acquire a drawable on the UI thread and queue `build(drawable)`
    fn submit_on_ui<F>(&self, resize_to: Option<(u32, u32)>, build: F)
    where
        F: FnOnce(Box<dyn Drawable>) -> RenderJob + Send + 'static,
    {
        let surface = Arc::clone(&self.surface);
        let jobs = self.jobs.clone();
        let closed = Arc::clone(&self.closed);
        let stats = Arc::clone(&self.stats);

        self.ui.dispatch(Box::new(move || {
            if closed.load(Ordering::Acquire) {
                return;
            }
            if let Some((width, height)) = resize_to {
                if width > 0 && height > 0 && surface.drawable_size() != (width, height) {
                    surface.set_drawable_size(width, height);
                }
            }
            let Some(drawable) = surface.next_drawable() else {
                log::trace!("No drawable available, skipping");
                CompositorStats::bump(&stats.skipped);
                return;
            };
            if jobs.send(build(drawable)).is_err() {
                log::debug!("Render thread gone, dropping drawable");
            }
        }));
    }
}

impl FrameRenderer for FrameCompositor {
    fn composite(&self, frame: Frame) {
        let size = frame.size();
        self.submit_on_ui(Some(size), move |drawable| RenderJob::Composite {
            frame,
            drawable,
        });
    }

    fn clear(&self) {
        self.submit_on_ui(None, |drawable| RenderJob::Clear { drawable });
    }
}

impl Drop for FrameCompositor {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.jobs.send(RenderJob::Shutdown);

        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Render thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for FrameCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCompositor")
            .field("format", &self.surface.format())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Colorimetry, ImageBuffer, PixelLayout};

    const EPSILON: f32 = 1e-3;

    fn apply(m: [[f32; 4]; 4], v: [f32; 3]) -> [f32; 3] {
        let input = [v[0], v[1], v[2], 1.0];
        let mut out = [0.0; 3];
        for (row, value) in out.iter_mut().enumerate() {
            *value = (0..4).map(|col| m[col][row] * input[col]).sum();
        }
        out
    }

    fn assert_rgb(actual: [f32; 3], expected: [f32; 3]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < EPSILON, "{:?} != {:?}", actual, expected);
        }
    }

    fn buffer(layout: PixelLayout, range: ColorRange) -> ImageBuffer {
        let planes = (0..layout.plane_count())
            .map(|i| {
                let (w, h) = layout.plane_size(i, 4, 4);
                let stride = w as usize * layout.bytes_per_texel(i);
                Plane {
                    data: vec![i as u8; stride * h as usize],
                    stride,
                    width: w,
                    height: h,
                }
            })
            .collect();
        ImageBuffer {
            layout,
            width: 4,
            height: 4,
            planes,
            colorimetry: Colorimetry {
                matrix: ColorMatrix::Bt709,
                range,
            },
            pts_ns: None,
        }
    }

    #[test]
    fn test_limited_range_extremes() {
        let m = ycbcr_matrix(ColorMatrix::Bt709, ColorRange::Limited);
        let neutral = 128.0 / 255.0;
        assert_rgb(apply(m, [235.0 / 255.0, neutral, neutral]), [1.0, 1.0, 1.0]);
        assert_rgb(apply(m, [16.0 / 255.0, neutral, neutral]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_full_range_gray_passes_through() {
        for matrix in [ColorMatrix::Bt601, ColorMatrix::Bt709, ColorMatrix::Bt2020] {
            let m = ycbcr_matrix(matrix, ColorRange::Full);
            let neutral = 128.0 / 255.0;
            assert_rgb(apply(m, [0.5, neutral, neutral]), [0.5, 0.5, 0.5]);
        }
    }

    #[test]
    fn test_red_chroma_raises_red_only() {
        let m = ycbcr_matrix(ColorMatrix::Bt601, ColorRange::Full);
        let neutral = 128.0 / 255.0;
        let [r, g, b] = apply(m, [0.5, neutral, neutral + 0.1]);
        assert!(r > 0.5);
        assert!(g < 0.5);
        assert!((b - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_separate_alpha_bindings() {
        let frame = Frame::SeparateAlpha {
            color: buffer(PixelLayout::Nv12, ColorRange::Limited),
            alpha: buffer(PixelLayout::Nv12, ColorRange::Limited),
        };
        let [luma, alpha, chroma] = plane_bindings(&frame).unwrap();
        assert_eq!(luma.slot, PlaneSlot::Luma);
        assert_eq!(alpha.slot, PlaneSlot::Alpha);
        assert_eq!(chroma.slot, PlaneSlot::Chroma);
        assert_eq!(chroma.format, PlaneFormat::Rg8);
        assert_eq!((chroma.plane.width, chroma.plane.height), (2, 2));
        // Alpha is the luma plane of the second stream
        assert!(std::ptr::eq(alpha.plane, frame.alpha().0.plane(0).unwrap()));
    }

    #[test]
    fn test_packed_alpha_uses_third_plane() {
        let frame = Frame::PackedAlpha(buffer(PixelLayout::Av12, ColorRange::Limited));
        let [_, alpha, _] = plane_bindings(&frame).unwrap();
        assert_eq!(alpha.plane.data[0], 2);
        assert_eq!((alpha.plane.width, alpha.plane.height), (4, 4));
    }

    #[test]
    fn test_missing_alpha_plane() {
        let frame = Frame::PackedAlpha(buffer(PixelLayout::Nv12, ColorRange::Limited));
        assert!(matches!(
            plane_bindings(&frame),
            Err(CompositeError::MissingPlane {
                slot: PlaneSlot::Alpha,
                plane: 2
            })
        ));
    }

    #[test]
    fn test_uniform_alpha_range() {
        let separate = Frame::SeparateAlpha {
            color: buffer(PixelLayout::Nv12, ColorRange::Limited),
            alpha: buffer(PixelLayout::Nv12, ColorRange::Limited),
        };
        let uniforms = CompositeUniforms::for_frame(&separate);
        assert!((uniforms.alpha_range[0] - 16.0 / 255.0).abs() < EPSILON);
        assert!((uniforms.alpha_range[1] - 255.0 / 219.0).abs() < EPSILON);

        let packed = Frame::PackedAlpha(buffer(PixelLayout::Av12, ColorRange::Limited));
        let uniforms = CompositeUniforms::for_frame(&packed);
        assert_eq!(&uniforms.alpha_range[..2], &[0.0, 1.0]);
        assert_eq!(std::mem::size_of::<CompositeUniforms>(), 80);
    }

    #[test]
    fn test_program_selection() {
        assert_eq!(
            CompositeProgram::for_kind(FrameKind::PackedAlpha).fragment_entry(),
            "fs_packed_alpha"
        );
        assert_eq!(
            CompositeProgram::for_kind(FrameKind::SeparateAlpha),
            CompositeProgram::SeparateAlpha
        );
    }
}
