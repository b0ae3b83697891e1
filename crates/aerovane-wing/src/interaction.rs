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

//! Wing interaction scans.
//!
//! On every vessel shape change each wing raycasts its surroundings in the
//! four planar directions of its own frame, recording how shadowed each
//! direction is and which neighboring wings cause it. The cached neighbor
//! lists then feed the per-physics-step upstream aggregation without any
//! further raycasting.

use std::collections::HashSet;

use aerovane_core::collision::{CollisionWorld, LayerMask, Ray};
use aerovane_core::math::{saturate, Vec3};
use aerovane_core::{Curve, PartId, WingSolverConfig};

use crate::curves::resolve_curves;
use crate::surface::{WingGeometry, WingId, WingSet};
use crate::upstream::EffectiveUpstreamWing;

/// Span/chord stations for the five-ray scan: `i * 0.2 + 0.1`.
pub(crate) const FULL_SCAN_STATIONS: [f64; 5] = [0.1, 0.3, 0.5, 0.7, 0.9];

/// The four planar scan directions of a wing's own frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// Chord-forward.
    Forward = 0,
    /// Chord-backward.
    Backward = 1,
    /// Against the span axis (towards the root for an unflipped wing).
    Leftward = 2,
    /// Along the span axis (towards the tip for an unflipped wing).
    Rightward = 3,
}

impl ScanDirection {
    /// All four directions in cache order.
    pub const ALL: [ScanDirection; 4] = [
        ScanDirection::Forward,
        ScanDirection::Backward,
        ScanDirection::Leftward,
        ScanDirection::Rightward,
    ];

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Cached interaction state of one wing.
///
/// Neighbor and influence lists are always the same length. Influence
/// weights are the raw per-slot values `1/ray_count * |cos|` summed over
/// duplicate slots; dropping a stale neighbor renormalizes the remainder
/// to sum to one.
pub struct WingInteraction {
    pub(crate) neighbors: [Vec<WingId>; 4],
    pub(crate) influences: [Vec<f64>; 4],
    pub(crate) exposure: [f64; 4],
    pub(crate) cl_interference: f64,
    pub(crate) effective: EffectiveUpstreamWing,
}

impl Default for WingInteraction {
    fn default() -> Self {
        Self {
            neighbors: Default::default(),
            influences: Default::default(),
            exposure: [1.0; 4],
            cl_interference: 1.0,
            effective: EffectiveUpstreamWing::default(),
        }
    }
}

impl WingInteraction {
    /// Exposure fraction in a direction: 1 fully exposed, 0 fully blocked.
    #[inline]
    pub fn exposure(&self, direction: ScanDirection) -> f64 {
        self.exposure[direction.index()]
    }

    /// The neighbor list and its parallel influence weights.
    pub fn neighbors(&self, direction: ScanDirection) -> (&[WingId], &[f64]) {
        let i = direction.index();
        (&self.neighbors[i], &self.influences[i])
    }

    /// Biplane interference factor from the two normal-direction raycasts.
    #[inline]
    pub fn cl_interference(&self) -> f64 {
        self.cl_interference
    }

    /// The upstream-wing bundle aggregated by the last
    /// `calculate_effects_of_upstream_wing` call.
    #[inline]
    pub fn effective_upstream(&self) -> &EffectiveUpstreamWing {
        &self.effective
    }

    /// Drops the neighbor at `index` in `direction` and renormalizes the
    /// remaining influence weights to sum to one.
    pub(crate) fn remove_neighbor(&mut self, direction: usize, index: usize) {
        self.neighbors[direction].swap_remove(index);
        self.influences[direction].swap_remove(index);
        let total: f64 = self.influences[direction].iter().sum();
        if total > 0.0 {
            for influence in &mut self.influences[direction] {
                *influence /= total;
            }
        }
    }
}

impl std::fmt::Debug for WingInteraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WingInteraction")
            .field("exposure", &self.exposure)
            .field("cl_interference", &self.cl_interference)
            .finish()
    }
}

/// The wing interaction solver.
///
/// Holds the raycast mask and the two camber curves, resolved once from
/// configuration at construction.
pub struct WingInteractionSolver {
    pub(crate) mask: LayerMask,
    pub(crate) camber_factor: Curve,
    pub(crate) camber_moment: Curve,
}

impl WingInteractionSolver {
    /// Builds the solver from host configuration.
    pub fn new(config: &WingSolverConfig) -> Self {
        let (camber_factor, camber_moment) = resolve_curves(config);
        Self {
            mask: config.raycast_mask,
            camber_factor,
            camber_moment,
        }
    }

    /// Recomputes one wing's directional exposures, neighbor lists and
    /// biplane interference. Call whenever the vessel's shape changed.
    ///
    /// `is_small_surface` selects the single-ray scan used for
    /// control-surface-sized parts. Returns the neighbor wings discovered,
    /// so callers can propagate recomputation.
    pub fn update_wing_interaction(
        &self,
        set: &mut WingSet,
        world: &dyn CollisionWorld,
        vessel_parts: &[PartId],
        wing: WingId,
        is_small_surface: bool,
    ) -> Vec<WingId> {
        let Some(entry) = set.entry(wing) else {
            log::warn!("update_wing_interaction: stale wing id {wing:?}");
            return Vec::new();
        };
        let geometry = entry.geometry;
        let self_part = entry.part;

        let mut exposure = [1.0f64; 4];
        let mut neighbors: [Vec<WingId>; 4] = Default::default();
        let mut influences: [Vec<f64>; 4] = Default::default();

        for direction in ScanDirection::ALL {
            let i = direction.index();
            let scan = self.scan_direction(
                set,
                world,
                vessel_parts,
                self_part,
                &geometry,
                direction,
                is_small_surface,
            );
            exposure[i] = scan.exposure;
            neighbors[i] = scan.neighbors;
            influences[i] = scan.influences;
        }

        let cl_interference =
            self.wing_interference(set, world, vessel_parts, self_part, &geometry);

        let mut discovered: Vec<WingId> = Vec::new();
        for list in &neighbors {
            for &id in list {
                if !discovered.contains(&id) {
                    discovered.push(id);
                }
            }
        }

        let entry = set.entry_mut(wing).expect("entry checked above");
        entry.small_surface = is_small_surface;
        entry.interaction.exposure = exposure;
        entry.interaction.neighbors = neighbors;
        entry.interaction.influences = influences;
        entry.interaction.cl_interference = cl_interference;

        discovered
    }

    /// Recomputes `start` and every wing its scans discover, transitively,
    /// guarded by a visited set so shared neighbors recompute once.
    pub fn update_nearby_interactions(
        &self,
        set: &mut WingSet,
        world: &dyn CollisionWorld,
        vessel_parts: &[PartId],
        start: WingId,
        start_is_small_surface: bool,
    ) {
        let mut visited: HashSet<WingId> = HashSet::new();
        let mut queue = vec![(start, start_is_small_surface)];
        while let Some((id, small)) = queue.pop() {
            if !visited.insert(id) {
                continue;
            }
            let discovered = self.update_wing_interaction(set, world, vessel_parts, id, small);
            for neighbor in discovered {
                if !visited.contains(&neighbor) {
                    let small = set
                        .entry(neighbor)
                        .map(|e| e.small_surface)
                        .unwrap_or(false);
                    queue.push((neighbor, small));
                }
            }
        }
    }

    // --- Scan Internals ---

    #[allow(clippy::too_many_arguments)]
    fn scan_direction(
        &self,
        set: &WingSet,
        world: &dyn CollisionWorld,
        vessel_parts: &[PartId],
        self_part: PartId,
        geometry: &WingGeometry,
        direction: ScanDirection,
        is_small_surface: bool,
    ) -> DirectionScan {
        let frame = geometry.frame;
        let tipward = frame.tipward(geometry.flipped);
        let sweep_tan = geometry.mid_chord_sweep.tan();

        let stations: &[f64] = if is_small_surface {
            &[0.5]
        } else {
            &FULL_SCAN_STATIONS
        };
        let decrement = 1.0 / stations.len() as f64;

        let mut scan = DirectionScan {
            exposure: 1.0,
            neighbors: Vec::new(),
            influences: Vec::new(),
        };

        for &station in stations {
            let (origin, ray_dir, max_distance) = match direction {
                ScanDirection::Forward | ScanDirection::Backward => {
                    // Rays march outboard along the mid-chord line, which
                    // sweeps back by tan(sweep) per unit span; reach is the
                    // tapered local chord.
                    let outboard = station * geometry.half_span;
                    let origin = frame.root_chord_mid + tipward * outboard as f32
                        - frame.forward * (sweep_tan * outboard) as f32;
                    let sign = if direction == ScanDirection::Forward {
                        1.0
                    } else {
                        -1.0
                    };
                    (origin, frame.forward * sign, geometry.chord_at(station) as f32)
                }
                ScanDirection::Leftward | ScanDirection::Rightward => {
                    // Rays march across the chord; reach is the half-span.
                    let along_chord = (station - 0.5) * geometry.mac;
                    let origin = frame.root_chord_mid + frame.forward * along_chord as f32;
                    let sign = if direction == ScanDirection::Rightward {
                        1.0
                    } else {
                        -1.0
                    };
                    (origin, tipward * sign, geometry.half_span as f32)
                }
            };

            let candidate = self.scan_ray(
                set,
                world,
                vessel_parts,
                self_part,
                frame.forward,
                &Ray::new(origin, ray_dir),
                max_distance,
                decrement,
                &mut scan.exposure,
            );

            if let Some((neighbor, influence)) = candidate {
                // De-duplicate across ray slots by summing the weights.
                match scan.neighbors.iter().position(|&n| n == neighbor) {
                    Some(existing) => scan.influences[existing] += influence,
                    None => {
                        scan.neighbors.push(neighbor);
                        scan.influences.push(influence);
                    }
                }
            }
        }

        scan
    }

    /// Casts one ray: the first valid hit reduces exposure once, and every
    /// hit competes (nearest first, angular-alignment tie-break) for the
    /// slot's candidate neighbor wing.
    #[allow(clippy::too_many_arguments)]
    fn scan_ray(
        &self,
        set: &WingSet,
        world: &dyn CollisionWorld,
        vessel_parts: &[PartId],
        self_part: PartId,
        self_forward: Vec3,
        ray: &Ray,
        max_distance: f32,
        decrement: f64,
        exposure: &mut f64,
    ) -> Option<(WingId, f64)> {
        let mut hits = world.raycast_all(ray, max_distance, self.mask);
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let mut first_hit = true;
        let mut best: Option<WingId> = None;
        let mut best_alignment = 0.0f64;

        for hit in &hits {
            if hit.part == self_part || !vessel_parts.contains(&hit.part) {
                continue;
            }
            if first_hit {
                *exposure = (*exposure - decrement).max(0.0);
                first_hit = false;
            }
            let Some(neighbor) = set.wing_of_part(hit.part) else {
                continue;
            };
            let Some(neighbor_geometry) = set.geometry(neighbor) else {
                continue;
            };
            let alignment =
                f64::from(self_forward.dot(neighbor_geometry.frame.forward)).abs();
            // Nearest hit wins ties: a farther wing must beat the current
            // alignment by more than 0.01 to take the slot.
            if alignment > best_alignment + 0.01 {
                best_alignment = alignment;
                best = Some(neighbor);
            }
        }

        best.map(|id| (id, decrement * best_alignment))
    }

    /// Biplane/multiplane interference: two opposite raycasts along the
    /// wing normal, combined with a fixed 0.5/0.5 weighting.
    fn wing_interference(
        &self,
        set: &WingSet,
        world: &dyn CollisionWorld,
        vessel_parts: &[PartId],
        self_part: PartId,
        geometry: &WingGeometry,
    ) -> f64 {
        let frame = geometry.frame;
        let distance = geometry.half_span as f32;
        if distance <= 0.0 {
            return 1.0;
        }
        let origin =
            frame.root_chord_mid + frame.tipward(geometry.flipped) * (0.5 * distance);

        let mut factor = 0.0;
        for normal in [frame.up, -frame.up] {
            let mut hits = world.raycast_all(&Ray::new(origin, normal), distance, self.mask);
            hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));

            let nearest_wing = hits.iter().find(|hit| {
                hit.part != self_part
                    && vessel_parts.contains(&hit.part)
                    && set.wing_of_part(hit.part).is_some()
            });
            let side = match nearest_wing {
                Some(hit) => saturate(f64::from(hit.distance / distance)),
                None => 1.0,
            };
            factor += 0.5 * side;
        }
        factor
    }
}

struct DirectionScan {
    exposure: f64,
    neighbors: Vec<WingId>,
    influences: Vec<f64>,
}

impl std::fmt::Debug for WingInteractionSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WingInteractionSolver")
            .field("mask", &self.mask)
            .finish()
    }
}
