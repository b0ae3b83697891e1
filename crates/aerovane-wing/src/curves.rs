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

//! Empirical camber curves for the flap-interaction model.
//!
//! Both curves are parameterized by the chord ratio
//! `this_chord / (this_chord + upstream_chord)` and tabulated at 0.1 steps
//! from thin-airfoil flap theory, linearly interpolated in between. The
//! sampled table is the contract; hosts may override the control points
//! through [`WingSolverConfig`].

use aerovane_core::{Curve, WingSolverConfig};

/// Flap-effectiveness factor `tau(e) = 1 - (theta - sin theta) / pi` with
/// `theta = acos(2e - 1)`.
fn flap_effectiveness(e: f64) -> f64 {
    let theta = (2.0 * e - 1.0).clamp(-1.0, 1.0).acos();
    1.0 - (theta - theta.sin()) / std::f64::consts::PI
}

/// Moment derivative `dCm/dCl` of a plain flap at chord ratio `e`.
///
/// The closed form is `-sin(theta)(1 - cos(theta)) / (4(pi - theta +
/// sin(theta)))`; its `e -> 0` limit is `-1/4`, pinned explicitly because
/// the expression is 0/0 there.
fn camber_moment(e: f64) -> f64 {
    if e <= 0.0 {
        return -0.25;
    }
    let theta = (2.0 * e - 1.0).clamp(-1.0, 1.0).acos();
    let denominator = 4.0 * (std::f64::consts::PI - theta + theta.sin());
    -theta.sin() * (1.0 - theta.cos()) / denominator
}

fn table(f: impl Fn(f64) -> f64) -> Vec<(f32, f32)> {
    (0..=10)
        .map(|i| {
            let e = f64::from(i) * 0.1;
            (e as f32, f(e) as f32)
        })
        .collect()
}

/// The default flap-effectiveness table.
pub fn default_camber_factor() -> Curve {
    Curve::new(table(flap_effectiveness))
}

/// The default moment-derivative table.
pub fn default_camber_moment() -> Curve {
    Curve::new(table(camber_moment))
}

/// Resolves the configured curves, substituting the built-in tables when a
/// host supplies no (or invalid) control points.
pub fn resolve_curves(config: &WingSolverConfig) -> (Curve, Curve) {
    let factor = if config.camber_factor_points.is_empty() {
        default_camber_factor()
    } else {
        let curve = Curve::new(config.camber_factor_points.clone());
        if curve.is_empty() {
            log::error!("wing config: invalid camber factor table, using built-in");
            default_camber_factor()
        } else {
            curve
        }
    };
    let moment = if config.camber_moment_points.is_empty() {
        default_camber_moment()
    } else {
        let curve = Curve::new(config.camber_moment_points.clone());
        if curve.is_empty() {
            log::error!("wing config: invalid camber moment table, using built-in");
            default_camber_moment()
        } else {
            curve
        }
    };
    (factor, moment)
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_effectiveness_endpoints_and_monotonicity() {
        let curve = default_camber_factor();
        assert_abs_diff_eq!(curve.evaluate(0.0), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(curve.evaluate(1.0), 1.0, epsilon = 1e-6);

        let mut last = -1.0f32;
        for i in 0..=10 {
            let value = curve.evaluate(i as f32 * 0.1);
            assert!(value >= last, "flap effectiveness must not decrease");
            last = value;
        }
    }

    #[test]
    fn test_moment_endpoints() {
        let curve = default_camber_moment();
        assert_abs_diff_eq!(curve.evaluate(0.0), -0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(curve.evaluate(1.0), 0.0, epsilon = 1e-6);
        // Mid-range values stay negative: lift gained aft of c/4 pitches down.
        assert!(curve.evaluate(0.5) < 0.0);
    }

    #[test]
    fn test_config_override_and_fallback() {
        let mut config = WingSolverConfig::default();
        config.camber_factor_points = vec![(0.0, 0.5), (1.0, 0.5)];
        let (factor, moment) = resolve_curves(&config);
        assert_eq!(factor.evaluate(0.3), 0.5);
        assert!(!moment.is_empty());

        // Invalid override falls back to the built-in table.
        config.camber_factor_points = vec![(1.0, 0.0), (0.0, 1.0)];
        let (factor, _) = resolve_curves(&config);
        assert_abs_diff_eq!(factor.evaluate(1.0), 1.0, epsilon = 1e-6);
    }
}
