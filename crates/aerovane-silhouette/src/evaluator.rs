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

//! The exposed-surface evaluator: the public face of subsystem 1.
//!
//! Owns the tagger, mesh store, batch pool, executor and the counting
//! device. `render` is always asynchronous — results arrive through the
//! request callbacks during a later `update` tick, never via return value,
//! so the CPU and GPU paths are indistinguishable to callers.

use aerovane_core::math::{Aabb, Mat4};
use aerovane_core::{DevicePreference, ExposureConfig, PartId};

use crate::batch::{BatchCallback, RenderBatch, ViewRequest};
use crate::device::{CpuDevice, DeviceKind, GpuDevice, NullDevice, RenderDevice};
use crate::error::RenderError;
use crate::executor::JobExecutor;
use crate::mesh::{MeshId, MeshStore, RendererId, SurfaceMesh};
use crate::tagger::ObjectTagger;

/// Counters a host can surface in its diagnostics overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorStats {
    /// Jobs currently in flight across all batches.
    pub jobs_in_flight: usize,
    /// Jobs completed since startup (including cancelled/failed).
    pub jobs_completed: u64,
    /// The backend selected at startup.
    pub device: DeviceKind,
}

/// Measures per-part exposed (projected silhouette) areas of an assembly.
pub struct ExposedSurfaceEvaluator {
    config: ExposureConfig,
    tagger: ObjectTagger,
    store: MeshStore,
    executor: JobExecutor,
    device: Box<dyn RenderDevice>,
    batches: Vec<RenderBatch>,
    bounds_cache: Option<(u64, Aabb)>,
}

impl ExposedSurfaceEvaluator {
    /// Builds the evaluator, probing for the preferred device once.
    ///
    /// The outcome of the probe is final for the session: a missing GPU
    /// under `PreferGpu` means CPU counting from here on, and under `Gpu`
    /// it means the degraded zero-output device.
    pub fn new(config: ExposureConfig) -> Self {
        let config = config.sanitized();
        let device = Self::probe_device(config.device_preference);
        Self {
            config,
            tagger: ObjectTagger::new(),
            store: MeshStore::new(),
            executor: JobExecutor::new(),
            device,
            batches: Vec::new(),
            bounds_cache: None,
        }
    }

    fn probe_device(preference: DevicePreference) -> Box<dyn RenderDevice> {
        match preference {
            DevicePreference::Cpu => Box::new(CpuDevice::new()),
            DevicePreference::PreferGpu => match GpuDevice::probe() {
                Ok(device) => Box::new(device),
                Err(err) => {
                    log::warn!(
                        "ExposedSurfaceEvaluator: GPU unavailable ({err:#}); \
                         falling back to CPU counting for this session"
                    );
                    Box::new(CpuDevice::new())
                }
            },
            DevicePreference::Gpu => match GpuDevice::probe() {
                Ok(device) => Box::new(device),
                Err(err) => {
                    log::error!(
                        "ExposedSurfaceEvaluator: GPU required but unavailable ({err:#}); \
                         exposure output degrades to zero"
                    );
                    Box::new(NullDevice)
                }
            },
        }
    }

    /// The backend that won the startup probe.
    pub fn device_kind(&self) -> DeviceKind {
        self.device.kind()
    }

    /// Registers a mesh for later renderer instancing.
    pub fn add_mesh(&mut self, mesh: SurfaceMesh) -> MeshId {
        self.store.add_mesh(mesh)
    }

    /// Creates a renderer for `mesh` at a vessel-local transform.
    pub fn add_renderer(&mut self, mesh: MeshId, transform: Mat4) -> RendererId {
        self.store.add_renderer(mesh, transform)
    }

    /// Updates a renderer's vessel-local transform.
    pub fn set_renderer_transform(&mut self, renderer: RendererId, transform: Mat4) {
        self.store.set_transform(renderer, transform);
        self.bounds_cache = None;
    }

    /// Tags `renderer` as part of `part`'s silhouette.
    pub fn setup_renderer(&mut self, part: PartId, renderer: RendererId) {
        self.tagger.setup_renderer(part, renderer, &mut self.store);
    }

    /// Tags several renderers as part of `part`'s silhouette.
    pub fn setup_renderers(&mut self, part: PartId, renderers: impl IntoIterator<Item = RendererId>) {
        self.tagger
            .setup_renderers(part, renderers, &mut self.store);
    }

    /// Number of exposure-tracked parts.
    pub fn object_count(&self) -> usize {
        self.tagger.object_count()
    }

    /// Drops every part registration. Indices become invalid and renderer
    /// sets return to their pool; meshes stay registered.
    pub fn reset(&mut self) {
        self.tagger.reset();
        self.bounds_cache = None;
    }

    /// Submits a batch of view-direction requests.
    ///
    /// Results arrive via the request callbacks during later [`update`]
    /// ticks; `on_completed` fires once after every direction finished.
    ///
    /// [`update`]: Self::update
    pub fn render(
        &mut self,
        requests: Vec<ViewRequest>,
        world_transform: Mat4,
        on_completed: Option<BatchCallback>,
        user_data: u64,
    ) -> Result<(), RenderError> {
        if requests.is_empty() {
            log::error!("ExposedSurfaceEvaluator: {}", RenderError::NoValidRequests);
            return Err(RenderError::NoValidRequests);
        }

        let bounds = self.vessel_bounds();

        // Take an idle batch out of the pool (so the call below can borrow
        // the rest of the evaluator), or start a fresh one.
        let idle = self.batches.iter().position(|b| b.active_jobs() == 0);
        let mut batch = match idle {
            Some(i) => self.batches.swap_remove(i),
            None => RenderBatch::new(),
        };

        let outcome = batch.execute(
            &self.tagger,
            &self.store,
            &mut self.executor,
            self.device.as_mut(),
            (self.config.render_width, self.config.render_height),
            requests,
            bounds,
            world_transform,
            on_completed,
            user_data,
        );
        self.batches.push(batch);

        outcome.map(|_| ())
    }

    /// Advances the pipeline by one scheduler tick, invoking callbacks for
    /// jobs that completed. Call once per frame.
    pub fn update(&mut self) {
        self.executor.poll(self.device.as_mut());
    }

    /// Blocks until all in-flight work completed. Teardown only.
    pub fn wait_for_update(&mut self) {
        self.executor.wait_for_completion(self.device.as_mut());
    }

    /// Pipeline counters.
    pub fn stats(&self) -> EvaluatorStats {
        EvaluatorStats {
            jobs_in_flight: self.executor.in_flight(),
            jobs_completed: self.executor.completed(),
            device: self.device.kind(),
        }
    }

    /// Vessel-local bounds over every tagged renderer, cached per tagger
    /// generation.
    fn vessel_bounds(&mut self) -> Aabb {
        let generation = self.tagger.generation();
        if let Some((cached_gen, bounds)) = self.bounds_cache {
            if cached_gen == generation {
                return bounds;
            }
        }
        let renderers: Vec<RendererId> = self
            .tagger
            .iter_renderers()
            .map(|(_, _, renderer)| renderer)
            .collect();
        let bounds = self.store.bounds_of(renderers);
        self.bounds_cache = Some((generation, bounds));
        bounds
    }
}

impl std::fmt::Debug for ExposedSurfaceEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExposedSurfaceEvaluator")
            .field("objects", &self.tagger.object_count())
            .field("device", &self.device.kind())
            .field("in_flight", &self.executor.in_flight())
            .finish()
    }
}
