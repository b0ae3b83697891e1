// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-job render resources.
//!
//! One in-flight job exclusively owns its resource record for its whole
//! lifetime; the pools in the devices provide reuse across time, never
//! sharing across concurrent jobs. Growth policies live here so both
//! backends obey the same rules: targets reallocate only on size mismatch,
//! count buffers grow geometrically with a fixed floor and are cleared,
//! not reallocated, when capacity already suffices.

/// Minimum count-buffer capacity, in slots.
pub const MIN_COUNT_CAPACITY: usize = 1024;

/// Byte stride between per-draw MVP matrices in the GPU uniform buffer.
///
/// Matches the downlevel default `min_uniform_buffer_offset_alignment`.
pub const UNIFORM_STRIDE: u64 = 256;

/// Ensures `counts` holds exactly `slots` zeroed entries.
///
/// Capacity never shrinks and grows by doubling from the floor, so a
/// fluctuating object count does not cause per-frame reallocation.
pub fn prepare_counts(counts: &mut Vec<u32>, slots: usize) {
    if counts.capacity() < slots {
        let mut capacity = MIN_COUNT_CAPACITY.max(counts.capacity());
        while capacity < slots {
            capacity *= 2;
        }
        counts.reserve_exact(capacity - counts.len());
    }
    counts.clear();
    counts.resize(slots, 0);
}

/// GPU-side resources owned by one in-flight job.
///
/// All handles are released exactly once; [`GpuJobResources::release`] is
/// idempotent so a teardown path crossing a completion path cannot
/// double-free.
pub struct GpuJobResources {
    /// Render target size these resources were built for.
    pub width: u32,
    /// Render target size these resources were built for.
    pub height: u32,
    /// `R32Uint` index color target.
    pub texture: wgpu::Texture,
    /// View of `texture`.
    pub texture_view: wgpu::TextureView,
    /// Depth target.
    pub depth: wgpu::Texture,
    /// View of `depth`.
    pub depth_view: wgpu::TextureView,
    /// Per-draw MVP matrices, one [`UNIFORM_STRIDE`] slot per draw.
    pub mvp_buffer: wgpu::Buffer,
    /// Capacity of `mvp_buffer`, in draws.
    pub mvp_capacity: usize,
    /// Bind group exposing `mvp_buffer` with a dynamic offset.
    pub draw_bind_group: wgpu::BindGroup,
    /// Storage buffer the compute kernel accumulates counts into, when the
    /// device has a compute path.
    pub count_buffer: Option<wgpu::Buffer>,
    /// Capacity of `count_buffer`, in `u32` slots.
    pub count_capacity: usize,
    /// Bind group for the count kernel (texture + count buffer).
    pub count_bind_group: Option<wgpu::BindGroup>,
    /// Host-mappable buffer the readback lands in.
    pub staging_buffer: wgpu::Buffer,
    /// Size of `staging_buffer` in bytes.
    pub staging_size: u64,
    released: bool,
}

/// Layouts needed to (re)build per-job bind groups.
pub struct GpuBindLayouts {
    /// Layout of the per-draw dynamic-uniform bind group.
    pub draw: wgpu::BindGroupLayout,
    /// Layout of the count-kernel bind group, present when the device
    /// compiled the compute pipeline.
    pub count: Option<wgpu::BindGroupLayout>,
}

impl GpuJobResources {
    /// Builds a fresh resource record sized for one job.
    pub fn new(
        device: &wgpu::Device,
        layouts: &GpuBindLayouts,
        width: u32,
        height: u32,
        draw_count: usize,
        tag_capacity: usize,
        use_compute: bool,
    ) -> Self {
        let (texture, texture_view) = make_color_target(device, width, height);
        let (depth, depth_view) = make_depth_target(device, width, height);

        let mvp_capacity = draw_count.max(1);
        let mvp_buffer = make_mvp_buffer(device, mvp_capacity);
        let draw_bind_group = make_draw_bind_group(device, &layouts.draw, &mvp_buffer);

        let mut record = Self {
            width,
            height,
            texture,
            texture_view,
            depth,
            depth_view,
            mvp_buffer,
            mvp_capacity,
            draw_bind_group,
            count_buffer: None,
            count_capacity: 0,
            count_bind_group: None,
            staging_buffer: make_staging_buffer(device, 4),
            staging_size: 4,
            released: false,
        };
        record.prepare_for_next_job(
            device,
            layouts,
            width,
            height,
            draw_count,
            tag_capacity,
            use_compute,
        );
        record
    }

    /// Re-fits the record for the next job.
    ///
    /// Targets reallocate only on size mismatch; the MVP and count buffers
    /// grow geometrically and are otherwise reused as-is. When
    /// `use_compute` is false (or the device has no count kernel layout)
    /// the compute-side bindings are skipped entirely; the caller is then
    /// responsible for choosing CPU counting.
    #[allow(clippy::too_many_arguments)]
    pub fn prepare_for_next_job(
        &mut self,
        device: &wgpu::Device,
        layouts: &GpuBindLayouts,
        width: u32,
        height: u32,
        draw_count: usize,
        tag_capacity: usize,
        use_compute: bool,
    ) {
        self.released = false;

        let mut rebind_count = false;
        if self.width != width || self.height != height {
            let (texture, texture_view) = make_color_target(device, width, height);
            let (depth, depth_view) = make_depth_target(device, width, height);
            self.texture = texture;
            self.texture_view = texture_view;
            self.depth = depth;
            self.depth_view = depth_view;
            self.width = width;
            self.height = height;
            rebind_count = true;
        }

        if draw_count > self.mvp_capacity {
            let mut capacity = self.mvp_capacity.max(1);
            while capacity < draw_count {
                capacity *= 2;
            }
            self.mvp_buffer = make_mvp_buffer(device, capacity);
            self.mvp_capacity = capacity;
            self.draw_bind_group = make_draw_bind_group(device, &layouts.draw, &self.mvp_buffer);
        }

        let compute_layout = if use_compute { layouts.count.as_ref() } else { None };
        match compute_layout {
            Some(layout) => {
                if tag_capacity > self.count_capacity || self.count_buffer.is_none() {
                    let mut capacity = MIN_COUNT_CAPACITY.max(self.count_capacity);
                    while capacity < tag_capacity {
                        capacity *= 2;
                    }
                    self.count_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("silhouette count buffer"),
                        size: (capacity * 4) as u64,
                        usage: wgpu::BufferUsages::STORAGE
                            | wgpu::BufferUsages::COPY_SRC
                            | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    }));
                    self.count_capacity = capacity;
                    rebind_count = true;
                }
                if rebind_count || self.count_bind_group.is_none() {
                    self.count_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("silhouette count bind group"),
                        layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::TextureView(&self.texture_view),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: self
                                    .count_buffer
                                    .as_ref()
                                    .expect("count buffer prepared above")
                                    .as_entire_binding(),
                            },
                        ],
                    }));
                }
            }
            None => {
                // No valid kernel: skip compute bindings without failing.
                self.count_bind_group = None;
            }
        }

        let staging_needed = self.staging_bytes_needed(tag_capacity, use_compute);
        if staging_needed > self.staging_size {
            self.staging_buffer = make_staging_buffer(device, staging_needed);
            self.staging_size = staging_needed;
        }
    }

    /// Bytes the readback needs: the count array with compute, one padded
    /// texture row per scanline without.
    pub fn staging_bytes_needed(&self, tag_capacity: usize, use_compute: bool) -> u64 {
        if use_compute && self.count_bind_group.is_some() {
            (tag_capacity.max(1) * 4) as u64
        } else {
            padded_bytes_per_row(self.width) as u64 * self.height as u64
        }
    }

    /// Drops the GPU handles. Safe to call twice.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.texture.destroy();
        self.depth.destroy();
        self.mvp_buffer.destroy();
        if let Some(buffer) = &self.count_buffer {
            buffer.destroy();
        }
        self.staging_buffer.destroy();
    }

    /// Whether [`release`](Self::release) has run.
    #[inline]
    pub fn is_released(&self) -> bool {
        self.released
    }
}

/// Row stride for texture readback, aligned to wgpu's copy requirement.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn make_color_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("silhouette index target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R32Uint,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn make_depth_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("silhouette depth target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Depth32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn make_mvp_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("silhouette mvp buffer"),
        size: capacity as u64 * UNIFORM_STRIDE,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn make_draw_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    mvp_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("silhouette draw bind group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: mvp_buffer,
                offset: 0,
                size: wgpu::BufferSize::new(64),
            }),
        }],
    })
}

fn make_staging_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("silhouette staging buffer"),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    })
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_counts_geometric_growth() {
        let mut counts = Vec::new();
        prepare_counts(&mut counts, 10);
        assert_eq!(counts.len(), 10);
        assert!(counts.capacity() >= MIN_COUNT_CAPACITY);

        let capacity = counts.capacity();
        counts[3] = 7;
        prepare_counts(&mut counts, 600);
        assert_eq!(counts.len(), 600);
        assert!(counts.iter().all(|&c| c == 0));
        // Still within the floor: no reallocation.
        assert_eq!(counts.capacity(), capacity);

        prepare_counts(&mut counts, MIN_COUNT_CAPACITY * 3);
        assert_eq!(counts.len(), MIN_COUNT_CAPACITY * 3);
        assert!(counts.capacity() >= MIN_COUNT_CAPACITY * 4);
    }

    #[test]
    fn test_padded_bytes_per_row() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(128), 512);
    }
}
