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

//! Orthographic camera fitting.
//!
//! Fits a tight orthographic projection around a bounding box (given as its
//! 8 world-space corners) seen from an arbitrary direction. The `1.1`
//! back-off factor and the `0.1` bounds epsilon are part of the numeric
//! contract; changing either changes every measured area.

use aerovane_core::math::{Mat4, Vec3};

/// Camera back-off along the look axis, as a multiple of the depth extent.
const BACKOFF_FACTOR: f32 = 1.1;
/// View-space expansion applied to all six projection bounds, so no geometry
/// pixel lands exactly on the projection boundary.
const BOUNDS_EPSILON: f32 = 0.1;

/// A fitted orthographic camera for one view direction.
#[derive(Debug, Clone, Copy)]
pub struct CameraFit {
    /// Camera position in world space.
    pub position: Vec3,
    /// Unit look direction.
    pub forward: Vec3,
    /// World-to-view matrix.
    pub view: Mat4,
    /// View-to-clip orthographic projection.
    pub projection: Mat4,
    /// Combined view-projection matrix.
    pub view_projection: Mat4,
    /// Width of the projected view volume (view-space X extent).
    pub ortho_width: f32,
    /// Height of the projected view volume (view-space Y extent).
    pub ortho_height: f32,
}

impl CameraFit {
    /// The world-space area one pixel covers at the given target resolution.
    #[inline]
    pub fn area_per_pixel(&self, width: u32, height: u32) -> f32 {
        (self.ortho_width / width as f32) * (self.ortho_height / height as f32)
    }

    /// Projected area of the fitted view volume (`x extent * y extent`).
    #[inline]
    pub fn projected_area(&self) -> f32 {
        self.ortho_width * self.ortho_height
    }
}

/// Fits an orthographic camera around `corners` looking along `look_dir`.
///
/// Returns `None` when `look_dir` is degenerate (zero length).
pub fn fit_camera(corners: &[Vec3; 8], look_dir: Vec3) -> Option<CameraFit> {
    let forward = look_dir.normalize();
    if forward == Vec3::ZERO {
        return None;
    }

    // Depth extent of the box along the look axis.
    let mut near = f32::INFINITY;
    let mut far = f32::NEG_INFINITY;
    let mut center = Vec3::ZERO;
    for &c in corners {
        let d = c.dot(forward);
        near = near.min(d);
        far = far.max(d);
        center += c;
    }
    center = center * (1.0 / 8.0);
    let extent = far - near;

    let position = center - forward * (extent * BACKOFF_FACTOR);

    // Look-rotation; pick an up axis that cannot be parallel to forward.
    let up = if forward.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let view = Mat4::look_at_rh(position, position + forward, up)?;

    // Tight view-space bounds over the projected corners.
    let mut vmin = Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
    let mut vmax = Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
    for &c in corners {
        let v = view.transform_point(c);
        vmin = vmin.min(v);
        vmax = vmax.max(v);
    }
    vmin = vmin - Vec3::ONE * BOUNDS_EPSILON;
    vmax = vmax + Vec3::ONE * BOUNDS_EPSILON;

    // In right-handed view space the geometry sits at negative Z.
    let z_near = -vmax.z;
    let z_far = -vmin.z;
    let projection = Mat4::orthographic_rh_zo(vmin.x, vmax.x, vmin.y, vmax.y, z_near, z_far);

    Some(CameraFit {
        position,
        forward,
        view,
        projection,
        view_projection: projection * view,
        ortho_width: vmax.x - vmin.x,
        ortho_height: vmax.y - vmin.y,
    })
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use aerovane_core::math::{approx_eq, Aabb, Vec4};

    #[test]
    fn test_fit_encloses_all_corners() {
        let corners = Aabb::from_min_max(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(4.0, 5.0, 6.0))
            .corners();
        let fit = fit_camera(&corners, Vec3::new(1.0, 1.0, 1.0)).unwrap();

        for &c in &corners {
            let clip = fit.view_projection * Vec4::from_vec3(c, 1.0);
            assert!(clip.x > -1.0 && clip.x < 1.0, "x out of clip: {}", clip.x);
            assert!(clip.y > -1.0 && clip.y < 1.0, "y out of clip: {}", clip.y);
            assert!(clip.z > 0.0 && clip.z < 1.0, "z out of clip: {}", clip.z);
        }
    }

    #[test]
    fn test_axis_aligned_extents_match_box_plus_epsilon() {
        let corners = Aabb::from_min_max(Vec3::ZERO, Vec3::new(2.0, 3.0, 4.0)).corners();
        let fit = fit_camera(&corners, Vec3::Z).unwrap();

        // Looking along +Z: view X spans the box X, view Y spans the box Y,
        // each padded by the epsilon on both sides.
        assert!(approx_eq(fit.ortho_width, 2.0 + 2.0 * BOUNDS_EPSILON));
        assert!(approx_eq(fit.ortho_height, 3.0 + 2.0 * BOUNDS_EPSILON));
    }

    #[test]
    fn test_camera_backs_off_by_factor() {
        let corners = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE).corners();
        let fit = fit_camera(&corners, Vec3::X).unwrap();
        // Depth extent along X is 2, so the camera sits at -2.2 on X.
        assert!(approx_eq(fit.position.x, -2.2));
        assert!(approx_eq(fit.position.y, 0.0));
        assert!(approx_eq(fit.position.z, 0.0));
    }

    #[test]
    fn test_vertical_look_direction_is_supported() {
        let corners = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE).corners();
        assert!(fit_camera(&corners, -Vec3::Y).is_some());
        assert!(fit_camera(&corners, Vec3::ZERO).is_none());
    }

    #[test]
    fn test_area_per_pixel_consistency() {
        let corners = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE).corners();
        let fit = fit_camera(&corners, Vec3::Z).unwrap();
        let per_pixel = fit.area_per_pixel(128, 64);
        assert!(approx_eq(per_pixel * (128.0 * 64.0), fit.projected_area()));
    }
}
