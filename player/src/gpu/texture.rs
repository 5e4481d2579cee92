use super::CompositeError;
use super::compositor::{PlaneBinding, PlaneFormat, PlaneSlot};
use anyhow::{Context, Result};
use std::collections::HashMap;

/// A GPU texture holding one decoded plane
struct PlaneTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: PlaneFormat,
    last_used: u64,
}

/// Plane textures keyed by binding slot.
///
/// A texture is reused while the plane keeps its size and format. Every
/// [`flush`](Self::flush) evicts textures no frame touched since the
/// previous flush, so switching between streams of different sizes does
/// not accumulate textures.
#[derive(Default)]
pub struct PlaneTextureCache {
    entries: HashMap<PlaneSlot, PlaneTexture>,
    generation: u64,
    hits: u64,
    misses: u64,
}

impl PlaneTextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload a plane into its slot's texture, creating the texture if needed
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        binding: &PlaneBinding<'_>,
    ) -> Result<(), CompositeError> {
        let plane = binding.plane;
        let row_bytes = plane.width as usize * binding.format.bytes_per_texel();
        validate_plane(binding, row_bytes)?;

        let reusable = self.entries.get(&binding.slot).is_some_and(|entry| {
            entry.width == plane.width && entry.height == plane.height && entry.format == binding.format
        });

        if reusable {
            self.hits += 1;
        } else {
            self.misses += 1;
            log::debug!(
                "Creating {:?} plane texture {}x{} ({:?})",
                binding.slot,
                plane.width,
                plane.height,
                binding.format
            );
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(binding.slot.label()),
                size: wgpu::Extent3d {
                    width: plane.width,
                    height: plane.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: binding.format.texture_format(),
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            self.entries.insert(
                binding.slot,
                PlaneTexture {
                    texture,
                    view,
                    width: plane.width,
                    height: plane.height,
                    format: binding.format,
                    last_used: self.generation,
                },
            );
        }

        let Some(entry) = self.entries.get_mut(&binding.slot) else {
            return Ok(());
        };
        entry.last_used = self.generation;

        // Decoder rows may be padded; the stride tells the copy where each row starts
        let len = plane.required_len(row_bytes);
        queue.write_texture(
            entry.texture.as_image_copy(),
            &plane.data[..len],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(plane.stride as u32),
                rows_per_image: Some(plane.height),
            },
            wgpu::Extent3d {
                width: plane.width,
                height: plane.height,
                depth_or_array_layers: 1,
            },
        );

        Ok(())
    }

    pub fn view(&self, slot: PlaneSlot) -> Option<&wgpu::TextureView> {
        self.entries.get(&slot).map(|entry| &entry.view)
    }

    /// Evict textures unused since the last flush and start a new generation
    pub fn flush(&mut self) {
        let generation = self.generation;
        self.entries.retain(|slot, entry| {
            let keep = entry.last_used == generation;
            if !keep {
                log::trace!("Evicting idle {:?} plane texture", slot);
            }
            keep
        });
        self.generation += 1;
    }

    /// (hits, misses) since creation
    pub fn hit_counts(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

fn validate_plane(binding: &PlaneBinding<'_>, row_bytes: usize) -> Result<(), CompositeError> {
    let plane = binding.plane;
    if plane.width == 0 || plane.height == 0 {
        return Err(CompositeError::EmptyFrame {
            width: plane.width,
            height: plane.height,
        });
    }
    if plane.stride < row_bytes {
        return Err(CompositeError::StrideTooSmall {
            slot: binding.slot,
            stride: plane.stride,
            row_bytes,
        });
    }
    let needed = plane.required_len(row_bytes);
    if plane.data.len() < needed {
        return Err(CompositeError::PlaneTooSmall {
            slot: binding.slot,
            needed,
            actual: plane.data.len(),
        });
    }
    Ok(())
}

/// Read an 8-bit 4-channel texture back to the CPU as tightly packed RGBA
pub fn read_texture_rgba(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<Vec<u8>> {
    let (width, height) = (texture.width(), texture.height());
    let swap_red_blue = match texture.format() {
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
        other => anyhow::bail!("Cannot read back texture format {:?}", other),
    };

    // Calculate aligned bytes per row (must be multiple of 256)
    let unpadded_bytes_per_row = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

    let buffer_size = (padded_bytes_per_row * height) as wgpu::BufferAddress;

    // Create staging buffer for GPU -> CPU copy
    let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: buffer_size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });

    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &staging_buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );

    queue.submit(Some(encoder.finish()));

    let buffer_slice = staging_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    let _ = device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    });

    rx.recv()
        .context("Failed to receive buffer mapping result")?
        .context("Failed to map GPU buffer")?;

    let data = buffer_slice.get_mapped_range();

    // Remove row padding, normalizing to RGBA
    let mut rgba = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
    for row in data.chunks(padded_bytes_per_row as usize).take(height as usize) {
        let row = &row[..unpadded_bytes_per_row as usize];
        if swap_red_blue {
            for pixel in row.chunks_exact(4) {
                rgba.extend_from_slice(&[pixel[2], pixel[1], pixel[0], pixel[3]]);
            }
        } else {
            rgba.extend_from_slice(row);
        }
    }

    drop(data);
    staging_buffer.unmap();

    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Plane;

    fn binding(plane: &Plane) -> PlaneBinding<'_> {
        PlaneBinding {
            slot: PlaneSlot::Chroma,
            plane,
            format: PlaneFormat::Rg8,
        }
    }

    #[test]
    fn test_validate_accepts_padded_rows() {
        let plane = Plane {
            data: vec![0; 64 * 2 + 8],
            stride: 64,
            width: 4,
            height: 3,
        };
        assert!(validate_plane(&binding(&plane), 8).is_ok());
    }

    #[test]
    fn test_validate_rejects_short_data() {
        let plane = Plane {
            data: vec![0; 10],
            stride: 8,
            width: 4,
            height: 2,
        };
        assert_eq!(
            validate_plane(&binding(&plane), 8),
            Err(CompositeError::PlaneTooSmall {
                slot: PlaneSlot::Chroma,
                needed: 16,
                actual: 10,
            })
        );
    }

    #[test]
    fn test_validate_rejects_narrow_stride() {
        let plane = Plane {
            data: vec![0; 64],
            stride: 4,
            width: 4,
            height: 2,
        };
        assert!(matches!(
            validate_plane(&binding(&plane), 8),
            Err(CompositeError::StrideTooSmall { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_plane() {
        let plane = Plane {
            data: Vec::new(),
            stride: 0,
            width: 0,
            height: 0,
        };
        assert!(matches!(
            validate_plane(&binding(&plane), 0),
            Err(CompositeError::EmptyFrame { .. })
        ));
    }
}
