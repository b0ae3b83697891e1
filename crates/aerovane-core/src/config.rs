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

//! Configuration for the two aerodynamics subsystems.
//!
//! The host resolves these once at startup (typically from JSON) and the
//! core treats them as opaque read-only inputs afterwards.

use serde::{Deserialize, Serialize};

use crate::collision::{LayerMask, ALL_LAYERS};

/// Which pixel-counting backend the exposed-surface evaluator should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DevicePreference {
    /// Use the GPU when a capable device exists, otherwise fall back to CPU.
    #[default]
    PreferGpu,
    /// Always count on the CPU.
    Cpu,
    /// Require the GPU; with no capable device the evaluator degrades to
    /// zero-area output instead of falling back.
    Gpu,
}

/// Configuration for the exposed-surface evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    /// Render target width in pixels.
    pub render_width: u32,
    /// Render target height in pixels.
    pub render_height: u32,
    /// Backend preference for pixel counting.
    pub device_preference: DevicePreference,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            render_width: 512,
            render_height: 512,
            device_preference: DevicePreference::default(),
        }
    }
}

impl ExposureConfig {
    /// Validates the configuration.
    ///
    /// Invalid values are rejected at this boundary: the problem is logged
    /// and the defaults are substituted, so a malformed host config can
    /// never halt the simulation.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let mut cfg = self;
        if cfg.render_width == 0 || cfg.render_height == 0 {
            log::error!(
                "ExposureConfig: zero render target size {}x{}; using {}x{}",
                cfg.render_width,
                cfg.render_height,
                defaults.render_width,
                defaults.render_height
            );
            cfg.render_width = defaults.render_width;
            cfg.render_height = defaults.render_height;
        }
        cfg
    }
}

/// Configuration for the wing interaction solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WingSolverConfig {
    /// Layer mask applied to every exposure/interference raycast.
    pub raycast_mask: LayerMask,
    /// Control points for the flap-effectiveness camber curve.
    ///
    /// Empty means "use the built-in 10-point table".
    pub camber_factor_points: Vec<(f32, f32)>,
    /// Control points for the camber moment-derivative curve.
    ///
    /// Empty means "use the built-in 10-point table".
    pub camber_moment_points: Vec<(f32, f32)>,
}

impl Default for WingSolverConfig {
    fn default() -> Self {
        Self {
            raycast_mask: ALL_LAYERS,
            camber_factor_points: Vec::new(),
            camber_moment_points: Vec::new(),
        }
    }
}

/// Parses a config value from JSON, substituting the default (with a logged
/// error) when the document is malformed.
pub fn from_json_or_default<T>(json: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    match serde_json::from_str(json) {
        Ok(value) => value,
        Err(err) => {
            log::error!("config: failed to parse JSON ({err}); using defaults");
            T::default()
        }
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_rejects_zero_resolution() {
        let cfg = ExposureConfig {
            render_width: 0,
            render_height: 256,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(cfg.render_width, 512);
        assert_eq!(cfg.render_height, 512);
    }

    #[test]
    fn test_json_roundtrip() {
        let cfg = ExposureConfig {
            render_width: 128,
            render_height: 64,
            device_preference: DevicePreference::Cpu,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: ExposureConfig = from_json_or_default(&json);
        assert_eq!(parsed.render_width, 128);
        assert_eq!(parsed.device_preference, DevicePreference::Cpu);
    }

    #[test]
    fn test_malformed_json_yields_default() {
        let parsed: WingSolverConfig = from_json_or_default("{not json");
        assert_eq!(parsed.raycast_mask, ALL_LAYERS);
        assert!(parsed.camber_factor_points.is_empty());
    }
}
