//! Presentable surfaces
//!
//! The compositor only sees [`SurfaceProvider`]: acquire a drawable, render
//! into its texture, present it. Acquisition and resizing happen on the UI
//! thread; the drawable is then handed to the render thread.

use super::context::GpuContext;
use super::texture::read_texture_rgba;
use super::CompositeError;
use crate::lock;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A texture that can be presented once
pub trait Drawable: Send {
    fn texture(&self) -> &wgpu::Texture;
    fn present(self: Box<Self>);
}

/// Source of drawables for one on-screen (or offscreen) layer
pub trait SurfaceProvider: Send + Sync {
    fn format(&self) -> wgpu::TextureFormat;

    fn drawable_size(&self) -> (u32, u32);

    fn set_drawable_size(&self, width: u32, height: u32);

    /// `None` when the surface is not ready; callers skip the frame
    fn next_drawable(&self) -> Option<Box<dyn Drawable>>;
}

struct SurfaceDrawable(wgpu::SurfaceTexture);

impl Drawable for SurfaceDrawable {
    fn texture(&self) -> &wgpu::Texture {
        &self.0.texture
    }

    fn present(self: Box<Self>) {
        self.0.present();
    }
}

/// A window surface configured for straight-alpha output.
///
/// The surface stays unconfigured until it is given a non-zero size.
pub struct WgpuSurface {
    context: Arc<GpuContext>,
    surface: wgpu::Surface<'static>,
    config: Mutex<wgpu::SurfaceConfiguration>,
    configured: Mutex<bool>,
}

impl WgpuSurface {
    pub fn new(
        context: Arc<GpuContext>,
        surface: wgpu::Surface<'static>,
        format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let capabilities = surface.get_capabilities(&context.adapter);
        if !capabilities.formats.contains(&format) {
            return Err(CompositeError::SurfaceFormatUnsupported(format).into());
        }

        // Straight alpha when the compositor supports it
        let alpha_mode = [
            wgpu::CompositeAlphaMode::PostMultiplied,
            wgpu::CompositeAlphaMode::PreMultiplied,
        ]
        .into_iter()
        .find(|mode| capabilities.alpha_modes.contains(mode))
        .or_else(|| capabilities.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        // Frames are written by render passes and may be read back
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if capabilities.usages.contains(wgpu::TextureUsages::COPY_SRC) {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }

        log::info!(
            "Surface format {:?}, alpha mode {:?}",
            format,
            alpha_mode
        );

        let config = wgpu::SurfaceConfiguration {
            usage,
            format,
            width: 0,
            height: 0,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        Ok(Self {
            context,
            surface,
            config: Mutex::new(config),
            configured: Mutex::new(false),
        })
    }

    fn reconfigure(&self) {
        let config = lock(&self.config);
        if config.width == 0 || config.height == 0 {
            return;
        }
        self.surface.configure(&self.context.device, &config);
        *lock(&self.configured) = true;
    }
}

impl SurfaceProvider for WgpuSurface {
    fn format(&self) -> wgpu::TextureFormat {
        lock(&self.config).format
    }

    fn drawable_size(&self) -> (u32, u32) {
        let config = lock(&self.config);
        (config.width, config.height)
    }

    fn set_drawable_size(&self, width: u32, height: u32) {
        {
            let mut config = lock(&self.config);
            if (config.width, config.height) == (width, height) {
                return;
            }
            config.width = width;
            config.height = height;
        }
        log::debug!("Drawable size set to {}x{}", width, height);
        self.reconfigure();
    }

    fn next_drawable(&self) -> Option<Box<dyn Drawable>> {
        if !*lock(&self.configured) {
            return None;
        }

        for _ in 0..2 {
            match self.surface.get_current_texture() {
                Ok(texture) => return Some(Box::new(SurfaceDrawable(texture))),
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    log::debug!("Surface lost or outdated, reconfiguring");
                    self.reconfigure();
                }
                Err(e) => {
                    log::debug!("No drawable available: {}", e);
                    return None;
                }
            }
        }
        None
    }
}

struct OffscreenState {
    width: u32,
    height: u32,
    texture: Option<Arc<wgpu::Texture>>,
}

struct OffscreenDrawable {
    texture: Arc<wgpu::Texture>,
    presented: Arc<AtomicU64>,
}

impl Drawable for OffscreenDrawable {
    fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    fn present(self: Box<Self>) {
        self.presented.fetch_add(1, Ordering::AcqRel);
    }
}

/// A surface backed by a single owned texture, readable from the CPU
pub struct OffscreenSurface {
    context: Arc<GpuContext>,
    format: wgpu::TextureFormat,
    state: Mutex<OffscreenState>,
    presented: Arc<AtomicU64>,
}

impl OffscreenSurface {
    pub fn new(context: Arc<GpuContext>, format: wgpu::TextureFormat) -> Self {
        Self {
            context,
            format,
            state: Mutex::new(OffscreenState {
                width: 0,
                height: 0,
                texture: None,
            }),
            presented: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of drawables presented so far
    pub fn presented_count(&self) -> u64 {
        self.presented.load(Ordering::Acquire)
    }

    /// Contents of the backing texture as tightly packed RGBA, if sized
    pub fn read_rgba(&self) -> Result<Option<Vec<u8>>> {
        let texture = lock(&self.state).texture.clone();
        match texture {
            Some(texture) => {
                read_texture_rgba(&self.context.device, &self.context.queue, &texture).map(Some)
            }
            None => Ok(None),
        }
    }
}

impl SurfaceProvider for OffscreenSurface {
    fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    fn drawable_size(&self) -> (u32, u32) {
        let state = lock(&self.state);
        (state.width, state.height)
    }

    fn set_drawable_size(&self, width: u32, height: u32) {
        let mut state = lock(&self.state);
        if (state.width, state.height) == (width, height) {
            return;
        }
        state.width = width;
        state.height = height;
        state.texture = (width > 0 && height > 0).then(|| {
            Arc::new(self.context.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Offscreen Drawable"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: self.format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            }))
        });
    }

    fn next_drawable(&self) -> Option<Box<dyn Drawable>> {
        let texture = lock(&self.state).texture.clone()?;
        Some(Box::new(OffscreenDrawable {
            texture,
            presented: Arc::clone(&self.presented),
        }))
    }
}
