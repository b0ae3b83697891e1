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

//! Wing-to-wing interaction solver.
//!
//! For every lifting surface on a vessel this crate maintains a raycast
//! picture of its surroundings — how shadowed each planar direction is and
//! which neighboring wings cause it — and folds that picture into the
//! corrections a flight model applies per physics step: upstream-wing
//! flap effects, an effective aspect-ratio factor, and a biplane
//! interference factor.
//!
//! The solver is purely synchronous and single-threaded; raycasts go
//! through the [`CollisionWorld`](aerovane_core::CollisionWorld) contract
//! and everything else is in-memory arithmetic over the wing arena.

pub mod curves;
pub mod interaction;
pub mod surface;
pub mod upstream;

pub use interaction::{ScanDirection, WingInteraction, WingInteractionSolver};
pub use surface::{WingAeroState, WingFrame, WingGeometry, WingId, WingSet};
pub use upstream::{EffectiveUpstreamWing, UpstreamEffects};
