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

//! Oriented-box collider storage with slab allocation and ray queries.

use super::{CollisionWorld, LayerMask, Ray, RaycastHit};
use crate::math::Vec3;
use crate::part::PartId;

const NULL_SLOT: u32 = u32::MAX;

/// An oriented box collider in world space.
#[derive(Debug, Clone, Copy)]
pub struct OrientedBox {
    /// Center of the box in world space.
    pub center: Vec3,
    /// Half-extent along each local axis.
    pub half_extents: Vec3,
    /// Orthonormal local axes of the box in world space.
    pub axes: [Vec3; 3],
}

impl OrientedBox {
    /// Creates an axis-aligned box collider.
    pub fn axis_aligned(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents,
            axes: [Vec3::X, Vec3::Y, Vec3::Z],
        }
    }

    /// Slab-tests a ray against the box.
    ///
    /// Returns the entry distance if the ray hits within `max_distance`.
    /// A ray starting inside the box reports the exit face instead of a
    /// negative entry distance.
    fn raycast(&self, ray: &Ray, max_distance: f32) -> Option<f32> {
        let rel = ray.origin - self.center;
        let mut t_min = 0.0f32;
        let mut t_max = max_distance;

        for axis in 0..3 {
            let e = self.axes[axis].dot(rel);
            let f = self.axes[axis].dot(ray.direction);
            let he = [
                self.half_extents.x,
                self.half_extents.y,
                self.half_extents.z,
            ][axis];

            if f.abs() > 1e-9 {
                let inv_f = 1.0 / f;
                let mut t1 = (-e - he) * inv_f;
                let mut t2 = (-e + he) * inv_f;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            } else if e.abs() > he {
                // Ray parallel to the slab and outside it.
                return None;
            }
        }

        Some(t_min)
    }
}

/// A generational handle to a collider slot in a [`ColliderWorld`].
///
/// Slots are recycled through a free list; the generation guarantees a
/// handle to a removed collider never aliases its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColliderId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct ColliderSlot {
    generation: u32,
    // `None` marks a free slot; `next_free` then chains the free list.
    body: Option<ColliderBody>,
    next_free: u32,
}

#[derive(Debug)]
struct ColliderBody {
    shape: OrientedBox,
    part: PartId,
    layers: LayerMask,
}

/// Stores vessel colliders in a slab with a free list and answers ray queries.
///
/// This is the reference implementation of [`CollisionWorld`] used by the
/// wing interaction solver and its tests; a host engine with its own physics
/// backend implements the trait directly instead.
#[derive(Debug, Default)]
pub struct ColliderWorld {
    slots: Vec<ColliderSlot>,
    free_head: u32,
    live_count: usize,
}

impl ColliderWorld {
    /// Creates an empty collider world.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: NULL_SLOT,
            live_count: 0,
        }
    }

    /// Number of live colliders.
    #[inline]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if no colliders are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Inserts a collider for `part` and returns its handle.
    pub fn insert(&mut self, shape: OrientedBox, part: PartId, layers: LayerMask) -> ColliderId {
        let body = ColliderBody {
            shape,
            part,
            layers,
        };
        self.live_count += 1;

        if self.free_head != NULL_SLOT {
            let index = self.free_head;
            let slot = &mut self.slots[index as usize];
            self.free_head = slot.next_free;
            slot.body = Some(body);
            ColliderId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(ColliderSlot {
                generation: 0,
                body: Some(body),
                next_free: NULL_SLOT,
            });
            ColliderId {
                index,
                generation: 0,
            }
        }
    }

    /// Removes a collider. Stale handles are ignored.
    pub fn remove(&mut self, id: ColliderId) {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return;
        };
        if slot.generation != id.generation || slot.body.is_none() {
            return;
        }
        slot.body = None;
        slot.generation = slot.generation.wrapping_add(1);
        slot.next_free = self.free_head;
        self.free_head = id.index;
        self.live_count -= 1;
    }

    /// Replaces the shape of a live collider (part moved). Stale handles are ignored.
    pub fn update_shape(&mut self, id: ColliderId, shape: OrientedBox) {
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            if slot.generation == id.generation {
                if let Some(body) = slot.body.as_mut() {
                    body.shape = shape;
                }
            }
        }
    }

    /// Returns the part owning a live collider.
    pub fn part_of(&self, id: ColliderId) -> Option<PartId> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.body.as_ref().map(|b| b.part)
    }
}

impl CollisionWorld for ColliderWorld {
    fn raycast_all(&self, ray: &Ray, max_distance: f32, mask: LayerMask) -> Vec<RaycastHit> {
        let mut hits = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(body) = slot.body.as_ref() else {
                continue;
            };
            if body.layers & mask == 0 {
                continue;
            }
            if let Some(distance) = body.shape.raycast(ray, max_distance) {
                hits.push(RaycastHit {
                    collider: ColliderId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    part: body.part,
                    distance,
                    point: ray.at(distance),
                });
            }
        }
        hits
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::ALL_LAYERS;
    use crate::math::approx_eq;

    fn unit_box_at(x: f32) -> OrientedBox {
        OrientedBox::axis_aligned(Vec3::new(x, 0.0, 0.0), Vec3::ONE * 0.5)
    }

    #[test]
    fn test_raycast_hits_boxes_in_path() {
        let mut world = ColliderWorld::new();
        world.insert(unit_box_at(2.0), PartId(0), ALL_LAYERS);
        world.insert(unit_box_at(5.0), PartId(1), ALL_LAYERS);
        world.insert(unit_box_at(-3.0), PartId(2), ALL_LAYERS);

        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let mut hits = world.raycast_all(&ray, 10.0, ALL_LAYERS);
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].part, PartId(0));
        assert!(approx_eq(hits[0].distance, 1.5));
        assert_eq!(hits[1].part, PartId(1));
        assert!(approx_eq(hits[1].distance, 4.5));
    }

    #[test]
    fn test_raycast_respects_max_distance_and_mask() {
        let mut world = ColliderWorld::new();
        world.insert(unit_box_at(2.0), PartId(0), 0b01);
        world.insert(unit_box_at(8.0), PartId(1), 0b10);

        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert_eq!(world.raycast_all(&ray, 3.0, ALL_LAYERS).len(), 1);
        assert_eq!(world.raycast_all(&ray, 10.0, 0b10).len(), 1);
        assert!(world.raycast_all(&ray, 10.0, 0b100).is_empty());
    }

    #[test]
    fn test_rotated_box_raycast() {
        // A box rotated 45 degrees around Z, hit along X.
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let shape = OrientedBox {
            center: Vec3::new(3.0, 0.0, 0.0),
            half_extents: Vec3::ONE * 0.5,
            axes: [
                Vec3::new(s, s, 0.0),
                Vec3::new(-s, s, 0.0),
                Vec3::Z,
            ],
        };
        let mut world = ColliderWorld::new();
        world.insert(shape, PartId(7), ALL_LAYERS);

        let hits = world.raycast_all(&Ray::new(Vec3::ZERO, Vec3::X), 10.0, ALL_LAYERS);
        assert_eq!(hits.len(), 1);
        // Corner-on: the diagonal half-width is sqrt(2)/2.
        assert!(approx_eq(hits[0].distance, 3.0 - 2.0f32.sqrt() * 0.5));
    }

    #[test]
    fn test_slot_reuse_does_not_alias_handles() {
        let mut world = ColliderWorld::new();
        let a = world.insert(unit_box_at(1.0), PartId(0), ALL_LAYERS);
        world.remove(a);
        let b = world.insert(unit_box_at(1.0), PartId(1), ALL_LAYERS);

        assert_ne!(a, b);
        assert_eq!(world.part_of(a), None);
        assert_eq!(world.part_of(b), Some(PartId(1)));
        assert_eq!(world.len(), 1);

        // Removing through the stale handle must not disturb the new collider.
        world.remove(a);
        assert_eq!(world.len(), 1);
    }
}
