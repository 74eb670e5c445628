// altitude.rs: barometric altitude anchored to satellite altitude
//
// The barometer carries short-term altitude change; good satellite altitudes
// slowly pull the anchors so the two cannot drift apart. Vertical velocity is
// integrated from acceleration for display only.

use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AltitudeConfig {
    /// Vertical accuracy (m) below which anchors are nudged
    pub good_vertical_accuracy_m: f64,
    pub anchor_weight: f64,
    pub vertical_velocity_decay: f64,
    pub gravity: f64,
}

impl Default for AltitudeConfig {
    fn default() -> Self {
        Self {
            good_vertical_accuracy_m: 15.0,
            anchor_weight: 0.3,
            vertical_velocity_decay: 0.95,
            gravity: 9.81,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AltitudeState {
    pub gps_reference: f64,
    pub baro_reference: f64,
    pub fused: f64,
    pub vertical_velocity: f64,
}

#[derive(Default)]
pub struct AltitudeEstimator {
    config: AltitudeConfig,
    state: Option<AltitudeState>,
}

/// Satellite altitude is usable when finite and non-zero; receivers report
/// exactly 0 when they have no vertical solution.
fn reported(altitude: Option<f64>) -> Option<f64> {
    altitude.filter(|a| a.is_finite() && *a != 0.0)
}

impl AltitudeEstimator {
    pub fn new(config: AltitudeConfig) -> Self {
        Self { config, state: None }
    }

    /// Returns the fused altitude, or `None` until a satellite altitude has
    /// anchored the estimator.
    pub fn update(
        &mut self,
        gps_altitude: Option<f64>,
        gps_vertical_accuracy: Option<f64>,
        baro_relative: Option<f64>,
        accel_z: Option<f64>,
        dt: f64,
    ) -> Option<f64> {
        let gps_altitude = reported(gps_altitude);
        let baro_relative = baro_relative.filter(|b| b.is_finite());

        let Some(state) = self.state.as_mut() else {
            let anchor = gps_altitude?;
            let baro_reference = baro_relative.unwrap_or(0.0);
            debug!("Altitude anchored at {:.1} m (baro ref {:.2} m)", anchor, baro_reference);
            self.state = Some(AltitudeState {
                gps_reference: anchor,
                baro_reference,
                fused: anchor,
                vertical_velocity: 0.0,
            });
            return Some(anchor);
        };
        let cfg = &self.config;

        if let Some(baro) = baro_relative {
            state.fused = state.gps_reference + (baro - state.baro_reference);
        } else if let Some(alt) = gps_altitude {
            state.fused = alt;
        }

        if let Some(az) = accel_z.filter(|a| a.is_finite()) {
            if dt > 0.0 {
                state.vertical_velocity += az * cfg.gravity * dt;
                state.vertical_velocity *= cfg.vertical_velocity_decay;
            }
        }

        let accurate = gps_vertical_accuracy
            .map(|v| v > 0.0 && v < cfg.good_vertical_accuracy_m)
            .unwrap_or(false);
        if let (Some(alt), true) = (gps_altitude, accurate) {
            let w = cfg.anchor_weight;
            state.gps_reference = (1.0 - w) * state.gps_reference + w * alt;
            if let Some(baro) = baro_relative {
                state.baro_reference = (1.0 - w) * state.baro_reference + w * baro;
            }
        }

        Some(state.fused)
    }

    pub fn altitude(&self) -> Option<f64> {
        self.state.map(|s| s.fused)
    }

    pub fn vertical_velocity(&self) -> f64 {
        self.state.map(|s| s.vertical_velocity).unwrap_or(0.0)
    }

    pub fn state(&self) -> Option<&AltitudeState> {
        self.state.as_ref()
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_none_until_anchored() {
        let mut alt = AltitudeEstimator::default();
        assert_eq!(alt.update(None, None, Some(3.0), Some(0.1), 0.1), None);
        assert_eq!(alt.update(Some(0.0), Some(5.0), Some(3.0), None, 0.1), None);
        assert_eq!(alt.altitude(), None);
        assert_eq!(alt.vertical_velocity(), 0.0);
    }

    #[test]
    fn test_baro_delta_from_anchor() {
        let mut alt = AltitudeEstimator::default();
        assert_eq!(alt.update(Some(100.0), None, None, None, 0.1), Some(100.0));
        let state = alt.state().unwrap();
        assert_eq!(state.baro_reference, 0.0);

        // Barometer climbs 10 m, satellite altitude not trusted
        let fused = alt.update(Some(104.0), Some(20.0), Some(10.0), None, 0.1).unwrap();
        assert_abs_diff_eq!(fused, 110.0);
    }

    #[test]
    fn test_falls_back_to_raw_gps_without_baro() {
        let mut alt = AltitudeEstimator::default();
        alt.update(Some(50.0), None, None, None, 0.1);
        assert_eq!(alt.update(Some(52.5), Some(30.0), None, None, 0.1), Some(52.5));
        // Nothing new: keeps the last estimate
        assert_eq!(alt.update(None, None, None, None, 0.1), Some(52.5));
    }

    #[test]
    fn test_good_vertical_accuracy_nudges_anchors() {
        let mut alt = AltitudeEstimator::default();
        alt.update(Some(100.0), None, Some(2.0), None, 0.1);

        let fused = alt.update(Some(110.0), Some(5.0), Some(4.0), None, 0.1).unwrap();
        // Fused from the anchors as they were before the nudge
        assert_abs_diff_eq!(fused, 102.0);
        let state = alt.state().unwrap();
        assert_abs_diff_eq!(state.gps_reference, 103.0, epsilon = 1e-12);
        assert_abs_diff_eq!(state.baro_reference, 2.6, epsilon = 1e-12);

        let fused = alt.update(None, None, Some(4.0), None, 0.1).unwrap();
        assert_abs_diff_eq!(fused, 104.4, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_vertical_accuracy_leaves_anchors() {
        let mut alt = AltitudeEstimator::default();
        alt.update(Some(100.0), None, Some(0.0), None, 0.1);
        for v_acc in [Some(-1.0), Some(0.0), Some(15.0), None] {
            alt.update(Some(140.0), v_acc, Some(0.0), None, 0.1);
        }
        let state = alt.state().unwrap();
        assert_eq!(state.gps_reference, 100.0);
        assert_eq!(state.fused, 100.0);
    }

    #[test]
    fn test_vertical_velocity_is_auxiliary() {
        let mut alt = AltitudeEstimator::default();
        alt.update(Some(100.0), None, Some(0.0), None, 0.1);
        alt.update(None, None, Some(0.0), Some(0.5), 0.1);
        assert_abs_diff_eq!(alt.vertical_velocity(), 0.5 * 9.81 * 0.1 * 0.95, epsilon = 1e-12);
        assert_eq!(alt.altitude(), Some(100.0));

        // Non-positive dt skips the integration
        let before = alt.vertical_velocity();
        alt.update(None, None, Some(0.0), Some(0.5), 0.0);
        assert_eq!(alt.vertical_velocity(), before);
    }

    #[test]
    fn test_reset() {
        let mut alt = AltitudeEstimator::default();
        alt.update(Some(100.0), None, None, None, 0.1);
        alt.reset();
        assert_eq!(alt.altitude(), None);
    }
}
