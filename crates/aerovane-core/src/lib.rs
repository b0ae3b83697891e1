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

//! Foundational types for the aerovane aerodynamics core.
//!
//! This crate holds everything both subsystems share: math primitives, the
//! raycast contract against the physics backend, the object pool, lookup
//! curves, configuration types, and the stable part handles used as map keys
//! throughout.

pub mod collision;
pub mod config;
pub mod curve;
pub mod math;
pub mod part;
pub mod pool;

pub use collision::{CollisionWorld, Ray, RaycastHit};
pub use config::{DevicePreference, ExposureConfig, WingSolverConfig};
pub use curve::Curve;
pub use part::PartId;
pub use pool::Pool;
