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

//! Upstream-wing influence aggregation.
//!
//! Every physics step each wing folds its cached neighbor lists into one
//! effective upstream wing and derives the downwash/flap-interaction
//! corrections from it. No raycasting happens here; the cached lists from
//! the last shape change are the only geometric input.

use aerovane_core::math::{saturate, Vec3};

use crate::interaction::ScanDirection;
use crate::surface::{WingId, WingSet};
use crate::WingInteractionSolver;

/// The influence-weighted aggregate of every unshielded upstream neighbor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EffectiveUpstreamWing {
    /// Mean aerodynamic chord.
    pub mac: f64,
    /// Half-span.
    pub half_span: f64,
    /// Planform area.
    pub area: f64,
    /// Lift-curve slope.
    pub lift_slope: f64,
    /// Stalled fraction.
    pub stall: f64,
    /// Cosine of sweep angle.
    pub cos_sweep: f64,
    /// Maximum angle of attack.
    pub aoa_max: f64,
    /// Zero-lift drag coefficient.
    pub zero_lift_cd: f64,
    /// Sign-corrected angle-of-attack delta relative to this wing.
    pub aoa_delta: f64,
    /// Total directional influence that was accumulated.
    pub influence: f64,
}

/// Corrections handed to the flight model each physics step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpstreamEffects {
    /// Weight of the aerodynamic-center shift caused by upstream lift.
    pub ac_weight: f64,
    /// Chordwise shift of the aerodynamic center.
    pub ac_shift: f64,
    /// Lift increment induced on this wing by the upstream surface.
    pub cl_increment_from_rear: f64,
}

impl WingInteractionSolver {
    /// Aggregates the cached upstream neighbors of `wing` and computes the
    /// flap-interaction corrections.
    ///
    /// `velocity_in_plane` is the local flow direction projected onto the
    /// wing plane (any length). The in-plane components select which two
    /// directional neighbor lists apply; their squared magnitudes bias the
    /// contributions toward purely fore/aft or purely lateral flow.
    ///
    /// At `clamp(1 - mach^2, 0, 1) == 0` every output is zero.
    pub fn calculate_effects_of_upstream_wing(
        &self,
        set: &mut WingSet,
        wing: WingId,
        aoa: f64,
        mach: f64,
        velocity_in_plane: Vec3,
    ) -> UpstreamEffects {
        let Some(entry) = set.entry(wing) else {
            log::warn!("calculate_effects_of_upstream_wing: stale wing id {wing:?}");
            return UpstreamEffects::default();
        };
        let geometry = entry.geometry;

        let v = velocity_in_plane.normalize();
        let forward_dir = f64::from(v.dot(geometry.frame.forward));
        let flip = if geometry.flipped { -1.0 } else { 1.0 };
        let rightward_dir = f64::from(v.dot(geometry.frame.right)) * flip;

        let chord_list = if forward_dir > 0.0 {
            ScanDirection::Forward
        } else {
            ScanDirection::Backward
        };
        let span_list = if rightward_dir > 0.0 {
            ScanDirection::Rightward
        } else {
            ScanDirection::Leftward
        };

        let mut effective = EffectiveUpstreamWing::default();
        self.accumulate_upstream(
            set,
            wing,
            chord_list,
            forward_dir * forward_dir,
            aoa,
            geometry.frame.forward,
            &mut effective,
        );
        self.accumulate_upstream(
            set,
            wing,
            span_list,
            rightward_dir * rightward_dir,
            aoa,
            geometry.frame.forward,
            &mut effective,
        );

        if let Some(entry) = set.entry_mut(wing) {
            entry.interaction.effective = effective;
        }

        let mach_coeff = saturate(1.0 - mach * mach);
        if mach_coeff <= 1e-12 || effective.influence <= 0.0 {
            return UpstreamEffects::default();
        }
        let chord_sum = geometry.mac + effective.mac;
        if chord_sum <= 0.0 || effective.half_span <= 0.0 || geometry.area <= 0.0 {
            return UpstreamEffects::default();
        }

        let flap_ratio = saturate(geometry.mac / chord_sum);
        let flap_factor = f64::from(self.camber_factor.evaluate(flap_ratio as f32));
        let dcm_dcl = f64::from(self.camber_moment.evaluate(flap_ratio as f32));

        // Span-mismatch corrections: the wing may outspan its flap-like
        // upstream neighbor or vice versa.
        let wing_fraction = saturate(geometry.half_span / effective.half_span);
        let flap_fraction = saturate(effective.half_span / geometry.half_span);

        let mut cl_increment = flap_factor * effective.lift_slope * effective.aoa_delta;
        cl_increment *= (geometry.area * flap_fraction + effective.area * wing_fraction)
            / geometry.area;

        UpstreamEffects {
            ac_weight: cl_increment * mach_coeff,
            ac_shift: (dcm_dcl + 0.75 * (1.0 - flap_ratio)) * chord_sum * mach_coeff,
            cl_increment_from_rear: cl_increment * mach_coeff,
        }
    }

    /// Combines the four directional exposures into an effective
    /// aspect-ratio multiplier for the given in-plane flow.
    ///
    /// The piecewise form (breakpoint at `sum = 1`) is deliberate: a
    /// gentle slope while one side is still mostly exposed, a steep
    /// penalty once both sides are heavily shadowed.
    pub fn effective_ar_factor(
        &self,
        set: &WingSet,
        wing: WingId,
        velocity_in_plane: Vec3,
    ) -> f64 {
        let Some(entry) = set.entry(wing) else {
            log::warn!("effective_ar_factor: stale wing id {wing:?}");
            return 1.0;
        };
        let geometry = &entry.geometry;
        let interaction = &entry.interaction;

        let v = velocity_in_plane.normalize();
        let forward_dir = f64::from(v.dot(geometry.frame.forward));
        let flip = if geometry.flipped { -1.0 } else { 1.0 };
        let rightward_dir = f64::from(v.dot(geometry.frame.right)) * flip;

        let forward_sq = forward_dir * forward_dir;
        let rightward_sq = rightward_dir * rightward_dir;

        let exposure = |d: ScanDirection| interaction.exposure(d);
        let mut wingtip_exposure = 0.0;
        let mut wingroot_exposure = 0.0;

        if forward_dir > 0.0 {
            wingtip_exposure += exposure(ScanDirection::Leftward) * forward_sq;
            wingroot_exposure += exposure(ScanDirection::Rightward) * forward_sq;
        } else {
            wingtip_exposure += exposure(ScanDirection::Rightward) * forward_sq;
            wingroot_exposure += exposure(ScanDirection::Leftward) * forward_sq;
        }
        if rightward_dir > 0.0 {
            wingtip_exposure += exposure(ScanDirection::Backward) * rightward_sq;
            wingroot_exposure += exposure(ScanDirection::Forward) * rightward_sq;
        } else {
            wingtip_exposure += exposure(ScanDirection::Forward) * rightward_sq;
            wingroot_exposure += exposure(ScanDirection::Backward) * rightward_sq;
        }

        let shadow_sum = (1.0 - wingtip_exposure) + (1.0 - wingroot_exposure);
        if shadow_sum < 1.0 {
            shadow_sum + 1.0
        } else {
            2.0 * (2.0 - shadow_sum) + 8.0 * (shadow_sum - 1.0)
        }
    }

    /// Walks one directional neighbor list, dropping stale entries (with
    /// weight renormalization) and accumulating the rest.
    #[allow(clippy::too_many_arguments)]
    fn accumulate_upstream(
        &self,
        set: &mut WingSet,
        wing: WingId,
        direction: ScanDirection,
        directional_influence: f64,
        this_aoa: f64,
        self_forward: Vec3,
        out: &mut EffectiveUpstreamWing,
    ) {
        let d = direction.index();
        let directional_influence = directional_influence.abs();
        let mut i = 0;
        loop {
            let (neighbor, stored_influence) = {
                let Some(entry) = set.entry(wing) else {
                    return;
                };
                match (
                    entry.interaction.neighbors[d].get(i),
                    entry.interaction.influences[d].get(i),
                ) {
                    (Some(&neighbor), Some(&influence)) => (neighbor, influence),
                    _ => break,
                }
            };

            let Some(upstream) = set.entry(neighbor) else {
                // Destroyed part: heal the cache in place and renormalize.
                log::debug!("upstream neighbor {neighbor:?} gone; removing from cache");
                if let Some(entry) = set.entry_mut(wing) {
                    entry.interaction.remove_neighbor(d, i);
                }
                // swap_remove moved the tail entry into slot i; rescan it.
                continue;
            };

            let geometry = upstream.geometry;
            let aero = upstream.aero;
            i += 1;

            if aero.shielded {
                continue;
            }

            let weight = stored_influence * directional_influence;
            out.mac += geometry.mac * weight;
            out.half_span += geometry.half_span * weight;
            out.area += geometry.area * weight;
            out.lift_slope += aero.lift_slope * weight;
            out.stall += aero.stall_fraction * weight;
            out.cos_sweep += aero.cos_sweep * weight;
            out.aoa_max += aero.aoa_max * weight;
            out.zero_lift_cd += aero.zero_lift_cd * weight;
            out.influence += weight;

            let sign = f64::from(self_forward.dot(geometry.frame.forward)).signum();
            out.aoa_delta += (this_aoa - aero.aoa * sign) * weight;
        }
    }
}
