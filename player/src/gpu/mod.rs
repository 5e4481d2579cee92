/// GPU compositing using wgpu
///
/// Decoded planar frames are uploaded plane by plane and blended into
/// straight-alpha RGBA in a single draw.
///
/// Architecture:
/// - `context`: wgpu device/queue management
/// - `pipeline_builder`: render pipeline and bind group layout helpers
/// - `texture`: per-plane texture cache and CPU readback
/// - `surface`: presentable surfaces (window-backed and offscreen)
/// - `compositor`: the render thread, composite programs and fallback clear
pub mod compositor;
pub mod context;
pub mod pipeline_builder;
pub mod surface;
pub mod texture;

pub use compositor::{
    CompositeProgram, CompositeUniforms, CompositorStats, CompositorStatsSnapshot,
    FrameCompositor, PlaneBinding, PlaneFormat, PlaneSlot, plane_bindings, ycbcr_matrix,
};
pub use context::GpuContext;
pub use surface::{Drawable, OffscreenSurface, SurfaceProvider, WgpuSurface};
pub use texture::PlaneTextureCache;

use crate::config::RenderSettings;
use thiserror::Error;

/// Render-path failures. Contained within the compositor, which falls back
/// to presenting a transparent drawable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    #[error("Frame has no plane {plane} for the {slot:?} texture")]
    MissingPlane { slot: PlaneSlot, plane: usize },

    #[error("Plane for {slot:?} is too small: need {needed} bytes, have {actual}")]
    PlaneTooSmall {
        slot: PlaneSlot,
        needed: usize,
        actual: usize,
    },

    #[error("Plane for {slot:?} has stride {stride} below its row size {row_bytes}")]
    StrideTooSmall {
        slot: PlaneSlot,
        stride: usize,
        row_bytes: usize,
    },

    #[error("Frame has zero size ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("Frame of {width}x{height} exceeds the {max} texture limit")]
    FrameTooLarge { width: u32, height: u32, max: u32 },

    #[error("Drawable format {actual:?} does not match the pipeline format {expected:?}")]
    FormatMismatch {
        expected: wgpu::TextureFormat,
        actual: wgpu::TextureFormat,
    },

    #[error("Surface format {0:?} is not supported")]
    SurfaceFormatUnsupported(wgpu::TextureFormat),
}

/// Output texture format named by `render.surface_format`
pub fn surface_format(settings: &RenderSettings) -> wgpu::TextureFormat {
    match settings.surface_format.as_str() {
        "rgba8unorm" => wgpu::TextureFormat::Rgba8Unorm,
        _ => wgpu::TextureFormat::Bgra8Unorm,
    }
}

/// Adapter preference named by `render.power_preference`
pub fn power_preference(settings: &RenderSettings) -> wgpu::PowerPreference {
    match settings.power_preference.as_str() {
        "low-power" => wgpu::PowerPreference::LowPower,
        _ => wgpu::PowerPreference::HighPerformance,
    }
}
