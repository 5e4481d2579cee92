/// GPU context management - handles wgpu device/queue initialization
use crate::config::RenderSettings;
use anyhow::{Context, Result};

/// GPU context containing instance, device, queue, and adapter info
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
    pub limits: wgpu::Limits,
}

impl GpuContext {
    /// Create a wgpu instance for surface creation ahead of [`GpuContext::with_instance`]
    pub fn create_instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    /// Create a headless GPU context
    pub async fn new(settings: &RenderSettings) -> Result<Self> {
        Self::with_instance(Self::create_instance(), settings, None).await
    }

    /// Blocking variant of [`GpuContext::new`]
    pub fn new_blocking(settings: &RenderSettings) -> Result<Self> {
        pollster::block_on(Self::new(settings))
    }

    /// Create a GPU context whose adapter can present to `compatible_surface`
    pub async fn with_instance(
        instance: wgpu::Instance,
        settings: &RenderSettings,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self> {
        log::info!("Initializing GPU context...");

        // Request adapter (GPU)
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: super::power_preference(settings),
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to find suitable GPU adapter")?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU adapter: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        // Request device and queue
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("alphaplay GPU Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .context("Failed to create GPU device")?;

        let limits = device.limits();

        log::info!("GPU context initialized successfully");
        log::info!("  Backend: {:?}", adapter_info.backend);
        log::info!(
            "  Max Texture Size: {}x{}",
            limits.max_texture_dimension_2d,
            limits.max_texture_dimension_2d
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            adapter_info,
            limits,
        })
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .finish()
    }
}
