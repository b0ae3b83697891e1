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

//! Ray queries against vessel colliders.
//!
//! The wing interaction solver only needs one operation from the physics
//! backend: cast a ray, get every collider it passes through. That contract
//! is the [`CollisionWorld`] trait; [`collider_world::ColliderWorld`] is the
//! in-crate implementation over oriented-box colliders.

pub mod collider_world;

pub use collider_world::{ColliderId, ColliderWorld, OrientedBox};

use crate::math::Vec3;
use crate::part::PartId;

/// Collision layer bits. Colliders and queries carry a mask; a query sees a
/// collider when the masks share at least one bit.
pub type LayerMask = u32;

/// A layer mask matching every collider.
pub const ALL_LAYERS: LayerMask = u32::MAX;

/// A ray with a normalized direction.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Starting point of the ray in world space.
    pub origin: Vec3,
    /// Unit-length direction of the ray.
    pub direction: Vec3,
}

impl Ray {
    /// Creates a ray, normalizing `direction`.
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Returns the point at `distance` along the ray.
    #[inline]
    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

/// One collider intersection reported by a ray query.
#[derive(Debug, Clone, Copy)]
pub struct RaycastHit {
    /// The collider that was hit.
    pub collider: ColliderId,
    /// The part the collider belongs to.
    pub part: PartId,
    /// Distance from the ray origin to the entry point.
    pub distance: f32,
    /// The entry point in world space.
    pub point: Vec3,
}

/// The raycast contract consumed from the physics/collision backend.
///
/// Hits are returned **unordered**; callers that care about depth sort by
/// [`RaycastHit::distance`] themselves.
pub trait CollisionWorld {
    /// Returns every collider intersected by `ray` within `max_distance`
    /// whose layer bits overlap `mask`.
    fn raycast_all(&self, ray: &Ray, max_distance: f32, mask: LayerMask) -> Vec<RaycastHit>;
}
