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

//! The wgpu backend.
//!
//! Renders every tracked renderer into an offscreen `R32Uint` target, then
//! either dispatches the count kernel (counts come back ready) or copies
//! the texture out for CPU counting. Readback is `map_async` based and
//! entirely poll-driven: `pump` advances the device once per executor tick
//! and never blocks.

use anyhow::Context;

use aerovane_core::math::Mat4;

use crate::camera::CameraFit;
use crate::mesh::DrawList;
use crate::raster::PixelGrid;
use crate::resources::{
    padded_bytes_per_row, prepare_counts, GpuBindLayouts, GpuJobResources, UNIFORM_STRIDE,
};

use super::{DeviceKind, Readback, RenderDevice};

const COUNT_WORKGROUP_SIZE: u32 = 8;

/// wgpu-backed render device.
pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    render_pipeline: wgpu::RenderPipeline,
    compute_pipeline: Option<wgpu::ComputePipeline>,
    layouts: GpuBindLayouts,
    mesh_data: Option<GpuMeshData>,
    free_resources: Vec<GpuJobResources>,
    pending: Vec<PendingReadback>,
}

struct GpuMeshData {
    generation: u64,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    tag_buffer: wgpu::Buffer,
    draws: Vec<GpuDraw>,
}

struct GpuDraw {
    index_count: u32,
    first_index: u32,
    base_vertex: i32,
}

enum ReadbackMode {
    /// Compute kernel produced counts; truncate the staging data to this
    /// many slots.
    Counts {
        tag_capacity: usize,
        tx: flume::Sender<Result<Vec<u32>, String>>,
    },
    /// Texture rows; unpad into a grid for CPU counting.
    Pixels {
        width: u32,
        height: u32,
        tx: flume::Sender<Result<PixelGrid, String>>,
    },
}

struct PendingReadback {
    resources: GpuJobResources,
    staging_bytes: u64,
    map_rx: flume::Receiver<Result<(), wgpu::BufferAsyncError>>,
    mode: ReadbackMode,
}

impl GpuDevice {
    /// Probes for a usable adapter and builds the device.
    ///
    /// This is the one-time capability check: failure here means the
    /// evaluator falls back (or degrades) for the whole session.
    pub fn probe() -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .context("no compatible graphics adapter")?;

        let info = adapter.get_info();
        let supports_compute = adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("aerovane-silhouette"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            ..Default::default()
        }))
        .context("device creation failed")?;

        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("silhouette draw layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(64),
                },
                count: None,
            }],
        });

        let render_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("silhouette render shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("render.wgsl").into()),
        });

        let render_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("silhouette render pipeline layout"),
            bind_group_layouts: &[&draw_layout],
            push_constant_ranges: &[],
        });

        let vertex_buffers = [
            wgpu::VertexBufferLayout {
                array_stride: 12,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x3],
            },
            wgpu::VertexBufferLayout {
                array_stride: 4,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &wgpu::vertex_attr_array![1 => Uint32],
            },
        ];

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("silhouette render pipeline"),
            layout: Some(&render_layout),
            vertex: wgpu::VertexState {
                module: &render_module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &vertex_buffers,
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // Silhouettes have no back faces.
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &render_module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::R32Uint,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let (compute_pipeline, count_layout) = if supports_compute {
            let count_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("silhouette count layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Uint,
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Storage { read_only: false },
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

            let count_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("silhouette count shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("count.wgsl").into()),
            });

            let compute_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("silhouette count pipeline layout"),
                bind_group_layouts: &[&count_layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("silhouette count pipeline"),
                layout: Some(&compute_layout),
                module: &count_module,
                entry_point: Some("count_pixels"),
                compilation_options: Default::default(),
                cache: None,
            });
            (Some(pipeline), Some(count_layout))
        } else {
            log::warn!(
                "GpuDevice: adapter '{}' lacks compute shaders; pixel counts fall back to CPU",
                info.name
            );
            (None, None)
        };

        log::info!(
            "GpuDevice: using adapter '{}' ({:?}), compute counting: {}",
            info.name,
            info.backend,
            compute_pipeline.is_some()
        );

        Ok(Self {
            device,
            queue,
            render_pipeline,
            compute_pipeline,
            layouts: GpuBindLayouts {
                draw: draw_layout,
                count: count_layout,
            },
            mesh_data: None,
            free_resources: Vec::new(),
            pending: Vec::new(),
        })
    }

    fn use_compute(&self) -> bool {
        self.compute_pipeline.is_some()
    }

    /// Re-records vertex/index/tag buffers when the draw list changed.
    ///
    /// Submitted command buffers keep the old buffers alive until the GPU
    /// is done with them, so in-flight jobs are unaffected by a rebuild.
    fn ensure_mesh_data(&mut self, draws: &DrawList) {
        if let Some(data) = &self.mesh_data {
            if data.generation == draws.generation && data.draws.len() == draws.commands.len() {
                return;
            }
        }

        let mut vertices: Vec<f32> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut tags: Vec<u32> = Vec::new();
        let mut gpu_draws = Vec::with_capacity(draws.commands.len());

        for command in &draws.commands {
            let base_vertex = (vertices.len() / 3) as i32;
            let first_index = indices.len() as u32;
            for v in &command.mesh.vertices {
                vertices.extend_from_slice(&[v.x, v.y, v.z]);
            }
            indices.extend_from_slice(&command.mesh.indices);
            tags.push(command.tag);
            gpu_draws.push(GpuDraw {
                index_count: command.mesh.indices.len() as u32,
                first_index,
                base_vertex,
            });
        }

        use wgpu::util::DeviceExt;
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("silhouette vertex buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("silhouette index buffer"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let tag_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("silhouette tag buffer"),
                contents: bytemuck::cast_slice(&tags),
                usage: wgpu::BufferUsages::VERTEX,
            });

        log::debug!(
            "GpuDevice: re-recorded mesh buffers for generation {} ({} draws)",
            draws.generation,
            gpu_draws.len()
        );

        self.mesh_data = Some(GpuMeshData {
            generation: draws.generation,
            vertex_buffer,
            index_buffer,
            tag_buffer,
            draws: gpu_draws,
        });
    }

    fn acquire_resources(
        &mut self,
        width: u32,
        height: u32,
        draw_count: usize,
        tag_capacity: usize,
    ) -> GpuJobResources {
        let use_compute = self.use_compute();
        match self.free_resources.pop() {
            Some(mut resources) => {
                resources.prepare_for_next_job(
                    &self.device,
                    &self.layouts,
                    width,
                    height,
                    draw_count,
                    tag_capacity,
                    use_compute,
                );
                resources
            }
            None => GpuJobResources::new(
                &self.device,
                &self.layouts,
                width,
                height,
                draw_count,
                tag_capacity,
                use_compute,
            ),
        }
    }
}

impl RenderDevice for GpuDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Gpu
    }

    fn render_view(
        &mut self,
        draws: &DrawList,
        world: &Mat4,
        fit: &CameraFit,
        width: u32,
        height: u32,
        tag_capacity: usize,
    ) -> Readback {
        self.ensure_mesh_data(draws);
        let resources = self.acquire_resources(width, height, draws.commands.len(), tag_capacity);
        let use_compute = self.use_compute() && resources.count_bind_group.is_some();

        // Upload one MVP matrix per draw into the dynamic uniform slots.
        let mesh_data = self.mesh_data.as_ref().expect("mesh data ensured above");
        let mut uniform_bytes = vec![0u8; mesh_data.draws.len().max(1) * UNIFORM_STRIDE as usize];
        for (i, command) in draws.commands.iter().enumerate() {
            let mvp = fit.view_projection * *world * command.transform;
            let offset = i * UNIFORM_STRIDE as usize;
            uniform_bytes[offset..offset + 64].copy_from_slice(bytemuck::bytes_of(&mvp));
        }
        self.queue
            .write_buffer(&resources.mvp_buffer, 0, &uniform_bytes);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("silhouette encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("silhouette index pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &resources.texture_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &resources.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.render_pipeline);
            pass.set_vertex_buffer(0, mesh_data.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh_data.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            for (i, draw) in mesh_data.draws.iter().enumerate() {
                let tag_offset = (i * 4) as u64;
                pass.set_bind_group(
                    0,
                    &resources.draw_bind_group,
                    &[(i as u64 * UNIFORM_STRIDE) as u32],
                );
                pass.set_vertex_buffer(1, mesh_data.tag_buffer.slice(tag_offset..tag_offset + 4));
                pass.draw_indexed(
                    draw.first_index..draw.first_index + draw.index_count,
                    draw.base_vertex,
                    0..1,
                );
            }
        }

        let staging_bytes = resources.staging_bytes_needed(tag_capacity, use_compute);
        if use_compute {
            let count_buffer = resources
                .count_buffer
                .as_ref()
                .expect("compute path has a count buffer");
            encoder.clear_buffer(count_buffer, 0, None);
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("silhouette count pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(self.compute_pipeline.as_ref().expect("compute path"));
                pass.set_bind_group(
                    0,
                    resources.count_bind_group.as_ref().expect("compute path"),
                    &[],
                );
                pass.dispatch_workgroups(
                    width.div_ceil(COUNT_WORKGROUP_SIZE),
                    height.div_ceil(COUNT_WORKGROUP_SIZE),
                    1,
                );
            }
            encoder.copy_buffer_to_buffer(
                count_buffer,
                0,
                &resources.staging_buffer,
                0,
                staging_bytes,
            );
        } else {
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: &resources.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &resources.staging_buffer,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_bytes_per_row(width)),
                        rows_per_image: Some(height),
                    },
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        let (map_tx, map_rx) = flume::bounded(1);
        resources
            .staging_buffer
            .slice(0..staging_bytes)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = map_tx.send(result);
            });

        let (readback, mode) = if use_compute {
            let (tx, rx) = flume::bounded(1);
            (Readback::Counts(rx), ReadbackMode::Counts { tag_capacity, tx })
        } else {
            let (tx, rx) = flume::bounded(1);
            (
                Readback::Pixels(rx),
                ReadbackMode::Pixels { width, height, tx },
            )
        };

        self.pending.push(PendingReadback {
            resources,
            staging_bytes,
            map_rx,
            mode,
        });

        readback
    }

    fn pump(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        // One non-blocking device poll per tick drives map_async callbacks.
        let _ = self.device.poll(wgpu::PollType::Poll);

        let mut still_pending = Vec::with_capacity(self.pending.len());
        for job in self.pending.drain(..) {
            match job.map_rx.try_recv() {
                Err(flume::TryRecvError::Empty) => still_pending.push(job),
                Ok(Ok(())) => {
                    let slice = job.resources.staging_buffer.slice(0..job.staging_bytes);
                    let data = slice.get_mapped_range();
                    match &job.mode {
                        ReadbackMode::Counts { tag_capacity, tx } => {
                            let mut counts = Vec::new();
                            prepare_counts(&mut counts, *tag_capacity);
                            let words: &[u32] = bytemuck::cast_slice(&data);
                            counts.copy_from_slice(&words[..*tag_capacity]);
                            let _ = tx.send(Ok(counts));
                        }
                        ReadbackMode::Pixels { width, height, tx } => {
                            let padded = padded_bytes_per_row(*width) as usize;
                            let mut tags = Vec::with_capacity((*width * *height) as usize);
                            for row in 0..*height as usize {
                                let start = row * padded;
                                let row_words: &[u32] = bytemuck::cast_slice(
                                    &data[start..start + (*width * 4) as usize],
                                );
                                tags.extend_from_slice(row_words);
                            }
                            let _ = tx.send(Ok(PixelGrid::from_tags(*width, *height, tags)));
                        }
                    }
                    drop(data);
                    job.resources.staging_buffer.unmap();
                    self.free_resources.push(job.resources);
                }
                Ok(Err(err)) => {
                    let message = format!("GPU readback failed: {err}");
                    log::error!("GpuDevice: {message}");
                    match &job.mode {
                        ReadbackMode::Counts { tx, .. } => {
                            let _ = tx.send(Err(message));
                        }
                        ReadbackMode::Pixels { tx, .. } => {
                            let _ = tx.send(Err(message));
                        }
                    }
                    self.free_resources.push(job.resources);
                }
                Err(flume::TryRecvError::Disconnected) => {
                    log::error!("GpuDevice: map_async callback dropped without reporting");
                    match &job.mode {
                        ReadbackMode::Counts { tx, .. } => {
                            let _ = tx.send(Err("readback callback lost".into()));
                        }
                        ReadbackMode::Pixels { tx, .. } => {
                            let _ = tx.send(Err("readback callback lost".into()));
                        }
                    }
                    self.free_resources.push(job.resources);
                }
            }
        }
        self.pending = still_pending;
    }

    fn reclaim_grid(&mut self, _grid: PixelGrid) {
        // Texture-readback grids are rebuilt from the staging rows each
        // job; the transient vec is cheap next to the copy itself.
    }
}

impl Drop for GpuDevice {
    fn drop(&mut self) {
        for mut job in self.pending.drain(..) {
            job.resources.release();
        }
        for mut resources in self.free_resources.drain(..) {
            resources.release();
        }
    }
}
