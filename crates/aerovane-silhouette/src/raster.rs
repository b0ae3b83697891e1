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

//! Software rasterizer for the CPU counting path.
//!
//! Projects every draw command through the fitted orthographic camera and
//! fills triangles into a tag grid with a depth buffer, so the nearest
//! surface owns each pixel exactly as the GPU path's depth test would
//! decide it. Both triangle windings are filled; a silhouette has no
//! back-face culling.

use aerovane_core::math::{Mat4, Vec3, Vec4};

use crate::camera::CameraFit;
use crate::mesh::DrawList;

/// A CPU render target: per-pixel tag indices plus a depth buffer.
///
/// Reallocation happens only on a size mismatch; re-preparing at the same
/// size just clears the contents.
#[derive(Debug, Default)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    tags: Vec<u32>,
    depth: Vec<f32>,
}

impl PixelGrid {
    /// Ensures the grid matches `width * height`, clearing it for reuse.
    pub fn prepare(&mut self, width: u32, height: u32) {
        let len = (width * height) as usize;
        if self.width != width || self.height != height {
            self.width = width;
            self.height = height;
            self.tags = vec![0; len];
            self.depth = vec![f32::INFINITY; len];
        } else {
            self.tags.fill(0);
            self.depth.fill(f32::INFINITY);
        }
    }

    /// Grid width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The tag written at each pixel, row-major.
    #[inline]
    pub fn tags(&self) -> &[u32] {
        &self.tags
    }

    /// Builds a grid directly from tag data (readback of a GPU target).
    pub fn from_tags(width: u32, height: u32, tags: Vec<u32>) -> Self {
        debug_assert_eq!(tags.len(), (width * height) as usize);
        Self {
            width,
            height,
            tags,
            depth: Vec::new(),
        }
    }
}

/// Rasterizes `draws` seen through `fit` into `grid`.
///
/// `world` is the vessel's world transform; each command's own transform is
/// vessel-local.
pub fn rasterize(draws: &DrawList, world: &Mat4, fit: &CameraFit, grid: &mut PixelGrid) {
    let width = grid.width as f32;
    let height = grid.height as f32;

    for command in &draws.commands {
        let mvp = fit.view_projection * *world * command.transform;

        // Project every vertex once per command.
        let projected: Vec<Vec3> = command
            .mesh
            .vertices
            .iter()
            .map(|&v| {
                let clip = mvp * Vec4::from_vec3(v, 1.0);
                // Orthographic: w stays 1, no perspective divide needed.
                Vec3::new(
                    (clip.x + 1.0) * 0.5 * width,
                    (clip.y + 1.0) * 0.5 * height,
                    clip.z,
                )
            })
            .collect();

        for tri in command.mesh.indices.chunks_exact(3) {
            let a = projected[tri[0] as usize];
            let b = projected[tri[1] as usize];
            let c = projected[tri[2] as usize];
            fill_triangle(grid, a, b, c, command.tag);
        }
    }
}

#[inline]
fn edge(a: Vec3, b: Vec3, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

fn fill_triangle(grid: &mut PixelGrid, a: Vec3, b: Vec3, c: Vec3, tag: u32) {
    let area = edge(a, b, c.x, c.y);
    if area.abs() < 1e-12 {
        return;
    }
    let inv_area = 1.0 / area;

    let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
    let max_x = (a.x.max(b.x).max(c.x).ceil() as i64).min(grid.width as i64 - 1);
    let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
    let max_y = (a.y.max(b.y).max(c.y).ceil() as i64).min(grid.height as i64 - 1);
    if max_x < 0 || max_y < 0 {
        return;
    }
    let (max_x, max_y) = (max_x as u32, max_y as u32);

    for y in min_y..=max_y {
        let py = y as f32 + 0.5;
        let row = (y * grid.width) as usize;
        for x in min_x..=max_x {
            let px = x as f32 + 0.5;

            // Signed barycentric weights; a pixel is inside when all three
            // share the triangle's winding sign.
            let w0 = edge(b, c, px, py) * inv_area;
            let w1 = edge(c, a, px, py) * inv_area;
            let w2 = edge(a, b, px, py) * inv_area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let z = w0 * a.z + w1 * b.z + w2 * c.z;
            let i = row + x as usize;
            if z < grid.depth[i] {
                grid.depth[i] = z;
                grid.tags[i] = tag;
            }
        }
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::fit_camera;
    use crate::mesh::{DrawCommand, SurfaceMesh};
    use aerovane_core::math::Aabb;
    use std::sync::Arc;

    fn draw_list_for(mesh: SurfaceMesh, transform: Mat4, tag: u32) -> DrawList {
        DrawList {
            commands: vec![DrawCommand {
                mesh: Arc::new(mesh),
                transform,
                tag,
            }],
            generation: 0,
        }
    }

    #[test]
    fn test_cube_face_coverage() {
        // A unit cube seen along +Z at 256x256. The projected square is
        // 1x1 inside a (1 + 0.2)^2 view volume.
        let mesh = SurfaceMesh::cuboid(Vec3::ONE * 0.5);
        let bounds = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE * 0.5);
        let fit = fit_camera(&bounds.corners(), Vec3::Z).unwrap();

        let draws = draw_list_for(mesh, Mat4::IDENTITY, 1);
        let mut grid = PixelGrid::default();
        grid.prepare(256, 256);
        rasterize(&draws, &Mat4::IDENTITY, &fit, &mut grid);

        let covered = grid.tags().iter().filter(|&&t| t == 1).count();
        let area = covered as f32 * fit.area_per_pixel(256, 256);

        // Discretization error is bounded by perimeter * pixel_size.
        let pixel_size = fit.ortho_width / 256.0;
        let tolerance = 4.0 * pixel_size;
        assert!(
            (area - 1.0).abs() <= tolerance,
            "cube face area {area} vs 1.0 (tolerance {tolerance})"
        );
    }

    #[test]
    fn test_depth_test_keeps_nearest_surface() {
        // Two overlapping quads. Looking along +Z the camera sits on the
        // -Z side, so the z = -1 quad (tag 2) is nearer and must own the
        // overlapped pixels.
        let quad = |z: f32| SurfaceMesh {
            vertices: vec![
                Vec3::new(-0.5, -0.5, z),
                Vec3::new(0.5, -0.5, z),
                Vec3::new(0.5, 0.5, z),
                Vec3::new(-0.5, 0.5, z),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
        };

        let bounds = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE);
        let fit = fit_camera(&bounds.corners(), Vec3::Z).unwrap();

        let mut draws = draw_list_for(quad(1.0), Mat4::IDENTITY, 1);
        draws.commands.push(DrawCommand {
            mesh: Arc::new(quad(-1.0)),
            transform: Mat4::IDENTITY,
            tag: 2,
        });

        let mut grid = PixelGrid::default();
        grid.prepare(64, 64);
        rasterize(&draws, &Mat4::IDENTITY, &fit, &mut grid);

        let ones = grid.tags().iter().filter(|&&t| t == 1).count();
        let twos = grid.tags().iter().filter(|&&t| t == 2).count();
        assert_eq!(ones, 0, "farther quad should be fully occluded");
        assert!(twos > 0);
    }

    #[test]
    fn test_prepare_reuses_allocation_at_same_size() {
        let mut grid = PixelGrid::default();
        grid.prepare(32, 32);
        grid.tags[5] = 9;
        let ptr = grid.tags.as_ptr();
        grid.prepare(32, 32);
        assert_eq!(grid.tags[5], 0);
        assert_eq!(grid.tags.as_ptr(), ptr);
    }
}
