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

//! The CPU backend: software rasterization on a worker thread.
//!
//! Even though everything is host-side, results are still delivered
//! through the readback channel and picked up on a later poll, keeping the
//! caller-visible contract identical to the GPU path.

use aerovane_core::math::Mat4;

use crate::camera::CameraFit;
use crate::mesh::DrawList;
use crate::raster::{rasterize, PixelGrid};

use super::{DeviceKind, Readback, RenderDevice};

/// Software rasterizer device.
pub struct CpuDevice {
    grid_pool: Vec<PixelGrid>,
}

impl CpuDevice {
    /// Creates the CPU device.
    pub fn new() -> Self {
        log::info!("CpuDevice: software rasterizer selected for pixel counting");
        Self {
            grid_pool: Vec::new(),
        }
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for CpuDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Cpu
    }

    fn render_view(
        &mut self,
        draws: &DrawList,
        world: &Mat4,
        fit: &CameraFit,
        width: u32,
        height: u32,
        _tag_capacity: usize,
    ) -> Readback {
        let mut grid = self.grid_pool.pop().unwrap_or_default();
        grid.prepare(width, height);

        let draws = draws.clone();
        let world = *world;
        let fit = *fit;
        let (tx, rx) = flume::bounded(1);

        std::thread::spawn(move || {
            rasterize(&draws, &world, &fit, &mut grid);
            // The executor may have been torn down; a dead channel is fine.
            let _ = tx.send(Ok(grid));
        });

        Readback::Pixels(rx)
    }

    fn pump(&mut self) {
        // All async progress happens on worker threads; nothing to pump.
    }

    fn reclaim_grid(&mut self, grid: PixelGrid) {
        self.grid_pool.push(grid);
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::fit_camera;
    use crate::mesh::{DrawCommand, SurfaceMesh};
    use aerovane_core::math::{Aabb, Vec3};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_render_view_delivers_grid_asynchronously() {
        let mut device = CpuDevice::new();
        let mesh = SurfaceMesh::cuboid(Vec3::ONE * 0.5);
        let draws = DrawList {
            commands: vec![DrawCommand {
                mesh: Arc::new(mesh),
                transform: Mat4::IDENTITY,
                tag: 1,
            }],
            generation: 0,
        };
        let bounds = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE * 0.5);
        let fit = fit_camera(&bounds.corners(), Vec3::Z).unwrap();

        let readback = device.render_view(&draws, &Mat4::IDENTITY, &fit, 64, 64, 2);
        let Readback::Pixels(rx) = readback else {
            panic!("CPU device must deliver pixels for CPU counting");
        };

        let grid = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker delivered")
            .expect("raster succeeded");
        assert!(grid.tags().iter().any(|&t| t == 1));
        device.reclaim_grid(grid);
        assert_eq!(device.grid_pool.len(), 1);
    }
}
