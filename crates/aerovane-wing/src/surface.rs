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

//! Wing surface storage.
//!
//! Wings live in a generational arena; every cached neighbor reference is
//! a [`WingId`] rather than a pointer, so a destroyed wing simply stops
//! resolving and the interaction caches heal themselves by dropping the
//! stale entry and renormalizing.

use std::collections::HashMap;

use aerovane_core::math::Vec3;
use aerovane_core::PartId;

use crate::interaction::WingInteraction;

const NULL_SLOT: u32 = u32::MAX;

/// World-space reference frame of a wing surface.
#[derive(Debug, Clone, Copy)]
pub struct WingFrame {
    /// Midpoint of the root chord in world space.
    pub root_chord_mid: Vec3,
    /// Chord-forward unit axis.
    pub forward: Vec3,
    /// Span unit axis in the part's own frame (before mirroring).
    pub right: Vec3,
    /// Wing normal unit axis.
    pub up: Vec3,
}

impl WingFrame {
    /// Span axis pointing from root towards the tip, with the mirrored
    /// attachment flip applied.
    #[inline]
    pub fn tipward(&self, flipped: bool) -> Vec3 {
        if flipped {
            -self.right
        } else {
            self.right
        }
    }
}

/// Geometry of one lifting surface.
#[derive(Debug, Clone, Copy)]
pub struct WingGeometry {
    /// Reference frame, updated by the host when the part moves.
    pub frame: WingFrame,
    /// Mean aerodynamic chord.
    pub mac: f64,
    /// Half-span (b/2).
    pub half_span: f64,
    /// Planform area.
    pub area: f64,
    /// Tip chord over root chord, in `[0, 1]`.
    pub taper_ratio: f64,
    /// Mid-chord sweep angle in radians.
    pub mid_chord_sweep: f64,
    /// True for the mirrored half of a symmetric attachment.
    pub flipped: bool,
}

impl WingGeometry {
    /// Local chord length at span fraction `f` (0 at root, 1 at tip),
    /// varying linearly with the taper ratio.
    pub fn chord_at(&self, f: f64) -> f64 {
        let root_chord = 2.0 * self.mac / (1.0 + self.taper_ratio);
        root_chord * (1.0 - f * (1.0 - self.taper_ratio))
    }
}

/// Per-step aerodynamic state of a wing, maintained by the host model.
#[derive(Debug, Clone, Copy, Default)]
pub struct WingAeroState {
    /// Lift-curve slope.
    pub lift_slope: f64,
    /// Stalled fraction in `[0, 1]`.
    pub stall_fraction: f64,
    /// Cosine of the sweep angle.
    pub cos_sweep: f64,
    /// Maximum angle of attack before stall.
    pub aoa_max: f64,
    /// Zero-lift drag coefficient increment.
    pub zero_lift_cd: f64,
    /// Current angle of attack in radians.
    pub aoa: f64,
    /// True when the part is aerodynamically shielded; shielded wings are
    /// skipped during upstream aggregation.
    pub shielded: bool,
}

pub(crate) struct WingEntry {
    pub part: PartId,
    pub geometry: WingGeometry,
    pub aero: WingAeroState,
    pub small_surface: bool,
    pub interaction: WingInteraction,
}

/// A generational handle to a wing in a [`WingSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WingId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

struct WingSlot {
    generation: u32,
    entry: Option<WingEntry>,
    next_free: u32,
}

/// Arena of all wing surfaces on a vessel.
pub struct WingSet {
    slots: Vec<WingSlot>,
    free_head: u32,
    by_part: HashMap<PartId, WingId>,
}

impl Default for WingSet {
    fn default() -> Self {
        Self::new()
    }
}

impl WingSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: NULL_SLOT,
            by_part: HashMap::new(),
        }
    }

    /// Registers a wing for `part`.
    ///
    /// `small_surface` marks control-surface-sized parts scanned with a
    /// single ray instead of five.
    pub fn insert(
        &mut self,
        part: PartId,
        geometry: WingGeometry,
        aero: WingAeroState,
        small_surface: bool,
    ) -> WingId {
        let entry = WingEntry {
            part,
            geometry,
            aero,
            small_surface,
            interaction: WingInteraction::default(),
        };

        let id = if self.free_head != NULL_SLOT {
            let index = self.free_head;
            let slot = &mut self.slots[index as usize];
            self.free_head = slot.next_free;
            slot.entry = Some(entry);
            WingId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(WingSlot {
                generation: 0,
                entry: Some(entry),
                next_free: NULL_SLOT,
            });
            WingId {
                index,
                generation: 0,
            }
        };

        self.by_part.insert(part, id);
        id
    }

    /// Destroys a wing. Its id (and every cached reference to it) becomes
    /// stale; neighbor lists heal lazily on their next traversal.
    pub fn remove(&mut self, id: WingId) {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return;
        };
        if slot.generation != id.generation {
            return;
        }
        if let Some(entry) = slot.entry.take() {
            self.by_part.remove(&entry.part);
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.next_free = self.free_head;
        self.free_head = id.index;
    }

    /// Resolves the wing registered for a part, if any.
    pub fn wing_of_part(&self, part: PartId) -> Option<WingId> {
        self.by_part.get(&part).copied()
    }

    /// The wing's geometry, or `None` for a stale id.
    pub fn geometry(&self, id: WingId) -> Option<&WingGeometry> {
        self.entry(id).map(|e| &e.geometry)
    }

    /// The wing's aero state, or `None` for a stale id.
    pub fn aero(&self, id: WingId) -> Option<&WingAeroState> {
        self.entry(id).map(|e| &e.aero)
    }

    /// Updates the frame after the part moved.
    pub fn set_frame(&mut self, id: WingId, frame: WingFrame) {
        if let Some(entry) = self.entry_mut(id) {
            entry.geometry.frame = frame;
        }
    }

    /// Replaces the per-step aero state.
    pub fn set_aero(&mut self, id: WingId, aero: WingAeroState) {
        if let Some(entry) = self.entry_mut(id) {
            entry.aero = aero;
        }
    }

    /// Read access to the interaction cache.
    pub fn interaction(&self, id: WingId) -> Option<&WingInteraction> {
        self.entry(id).map(|e| &e.interaction)
    }

    /// Number of live wings.
    pub fn len(&self) -> usize {
        self.by_part.len()
    }

    /// True when no wings are registered.
    pub fn is_empty(&self) -> bool {
        self.by_part.is_empty()
    }

    /// Iterates live wing ids.
    pub fn ids(&self) -> impl Iterator<Item = WingId> + '_ {
        self.by_part.values().copied()
    }

    pub(crate) fn entry(&self, id: WingId) -> Option<&WingEntry> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub(crate) fn entry_mut(&mut self, id: WingId) -> Option<&mut WingEntry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }
}

impl std::fmt::Debug for WingSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WingSet").field("wings", &self.len()).finish()
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;

    fn test_geometry() -> WingGeometry {
        WingGeometry {
            frame: WingFrame {
                root_chord_mid: Vec3::ZERO,
                forward: Vec3::Z,
                right: Vec3::X,
                up: Vec3::Y,
            },
            mac: 1.0,
            half_span: 2.0,
            area: 4.0,
            taper_ratio: 1.0,
            mid_chord_sweep: 0.0,
            flipped: false,
        }
    }

    #[test]
    fn test_stale_ids_resolve_to_none() {
        let mut set = WingSet::new();
        let id = set.insert(PartId(1), test_geometry(), WingAeroState::default(), false);
        assert!(set.geometry(id).is_some());
        assert_eq!(set.wing_of_part(PartId(1)), Some(id));

        set.remove(id);
        assert!(set.geometry(id).is_none());
        assert_eq!(set.wing_of_part(PartId(1)), None);

        // Slot reuse must not resurrect the old id.
        let replacement = set.insert(PartId(2), test_geometry(), WingAeroState::default(), false);
        assert!(set.geometry(id).is_none());
        assert!(set.geometry(replacement).is_some());
        assert_ne!(id, replacement);
    }

    #[test]
    fn test_chord_taper() {
        let mut geometry = test_geometry();
        assert!((geometry.chord_at(0.0) - 1.0).abs() < 1e-9);
        assert!((geometry.chord_at(1.0) - 1.0).abs() < 1e-9);

        geometry.taper_ratio = 0.5;
        // Root chord is 2 * mac / (1 + t) = 4/3; the tip is half of that.
        assert!((geometry.chord_at(0.0) - 4.0 / 3.0).abs() < 1e-9);
        assert!((geometry.chord_at(1.0) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_tipward_flip() {
        let geometry = test_geometry();
        assert_eq!(geometry.frame.tipward(false), Vec3::X);
        assert_eq!(geometry.frame.tipward(true), -Vec3::X);
    }
}
