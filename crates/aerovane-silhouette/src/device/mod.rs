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

//! Counting backends behind a uniform device interface.
//!
//! The backend is selected once at evaluator startup by capability probing
//! and never re-checked per request. Every backend delivers its results
//! through the same asynchronous readback channels, so callers cannot tell
//! the paths apart except by throughput.

pub mod cpu;
pub mod gpu;

pub use cpu::CpuDevice;
pub use gpu::GpuDevice;

use aerovane_core::math::Mat4;

use crate::camera::CameraFit;
use crate::mesh::DrawList;
use crate::raster::PixelGrid;

/// Which backend a device runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Software rasterizer + scoped-thread counting.
    Cpu,
    /// wgpu offscreen rendering, counted by a compute kernel (or read back
    /// for CPU counting when the kernel is unavailable).
    Gpu,
    /// No working backend; produces zero counts so the host keeps running.
    Null,
}

/// The async primitive a job waits on during its `Readback` state.
///
/// Errors arrive as messages rather than types: the executor only logs
/// them and terminates the job, per the swallow-at-this-layer policy.
pub enum Readback {
    /// Raw tag texels; a CPU counting pass follows (`CountJob` state).
    Pixels(flume::Receiver<Result<PixelGrid, String>>),
    /// Final per-tag counts produced device-side; the job completes on
    /// arrival.
    Counts(flume::Receiver<Result<Vec<u32>, String>>),
}

/// A pixel-counting render backend.
///
/// `render_view` must never block: GPU work is queued, CPU work moves to a
/// worker thread. The executor calls `pump` exactly once per poll tick to
/// advance device-side async machinery.
pub trait RenderDevice {
    /// The backend this device runs on.
    fn kind(&self) -> DeviceKind;

    /// Starts the asynchronous projection + count of one view direction.
    ///
    /// `tag_capacity` is the number of count slots (object count plus the
    /// background sentinel).
    fn render_view(
        &mut self,
        draws: &DrawList,
        world: &Mat4,
        fit: &CameraFit,
        width: u32,
        height: u32,
        tag_capacity: usize,
    ) -> Readback;

    /// Non-blocking pump of device-side async progress.
    fn pump(&mut self);

    /// Returns a grid previously delivered through [`Readback::Pixels`]
    /// so the device can recycle its allocation.
    fn reclaim_grid(&mut self, grid: PixelGrid);
}

/// The degraded backend used when a required device cannot be created:
/// every request completes with zero counts.
pub struct NullDevice;

impl RenderDevice for NullDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Null
    }

    fn render_view(
        &mut self,
        _draws: &DrawList,
        _world: &Mat4,
        _fit: &CameraFit,
        _width: u32,
        _height: u32,
        tag_capacity: usize,
    ) -> Readback {
        let (tx, rx) = flume::bounded(1);
        let _ = tx.send(Ok(vec![0u32; tag_capacity]));
        Readback::Counts(rx)
    }

    fn pump(&mut self) {}

    fn reclaim_grid(&mut self, _grid: PixelGrid) {}
}
