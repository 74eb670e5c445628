// dead_reckoning.rs: standalone fallback extrapolator for total signal loss
//
// Deliberately cruder than the fusion engine's inertial path: no pitch/roll
// compensation and no stationary detection. It keeps its own track state and
// is switched on and off by the caller.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{check_dt, FusionError, FusionResult};
use crate::geo::{self, wrap_angle};
use crate::types::{body_to_ne, AccelNe, FixSample, GeoPoint, InertialSample, VelocityNe};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadReckoningConfig {
    pub velocity_decay: f64,
    /// |ax| or |ay| must exceed this (g) to be integrated
    pub motion_accel_threshold: f64,
    pub gravity: f64,
}

impl Default for DeadReckoningConfig {
    fn default() -> Self {
        Self {
            velocity_decay: 0.995,
            motion_accel_threshold: 0.05,
            gravity: 9.81,
        }
    }
}

/// Last fix handed to the fallback.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LastFix {
    pub position: GeoPoint,
    pub speed: f64,
    pub course: f64,
    pub timestamp: f64,
}

/// Intermediate values of one step, for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DeadReckoningDebug {
    pub velocity_north: f64,
    pub velocity_east: f64,
    pub delta_yaw: f64,
    pub accel_north: f64,
    pub accel_east: f64,
    /// Degrees
    pub delta_lat: f64,
    /// Degrees
    pub delta_lon: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DeadReckoningSnapshot {
    pub position: GeoPoint,
    pub speed: f64,
    pub heading_deg: f64,
    pub elapsed_secs: f64,
    pub last_fix: LastFix,
    pub debug: DeadReckoningDebug,
}

pub struct DeadReckoning {
    config: DeadReckoningConfig,

    last_fix: Option<LastFix>,
    position: Option<GeoPoint>,
    velocity: VelocityNe,
    heading: f64,
    last_yaw: Option<f64>,

    active: bool,
    // Fix timestamp plus accumulated dt
    clock: f64,
    activated_at: Option<f64>,
}

impl Default for DeadReckoning {
    fn default() -> Self {
        Self::new(DeadReckoningConfig::default())
    }
}

impl DeadReckoning {
    pub fn new(config: DeadReckoningConfig) -> Self {
        Self {
            config,
            last_fix: None,
            position: None,
            velocity: VelocityNe::zeros(),
            heading: 0.0,
            last_yaw: None,
            active: false,
            clock: 0.0,
            activated_at: None,
        }
    }

    /// Snapshot a fix and restart from it. Always deactivates.
    pub fn update_fix(&mut self, fix: &FixSample) -> FusionResult<()> {
        let position = fix.position();
        position.validate()?;

        // Unknown speed/course: restart from rest, keep the old heading
        self.velocity = fix.velocity_ne().unwrap_or_else(VelocityNe::zeros);
        if fix.course_known() {
            self.heading = fix.course.to_radians();
        }
        self.last_fix = Some(LastFix {
            position,
            speed: fix.speed.max(0.0),
            course: fix.course,
            timestamp: fix.timestamp,
        });
        self.position = Some(position);
        if fix.timestamp.is_finite() {
            self.clock = fix.timestamp;
        }

        if self.active {
            info!("Dead reckoning stopped: fix at ({:.6}, {:.6})", position.latitude, position.longitude);
        }
        self.active = false;
        self.activated_at = None;
        Ok(())
    }

    /// Begin extrapolating from the last fix. Returns false when no fix has
    /// been seen yet.
    pub fn activate(&mut self) -> bool {
        let Some(last_fix) = self.last_fix else {
            debug!("Dead reckoning requested before any fix");
            return false;
        };
        if !self.active {
            self.active = true;
            self.activated_at = Some(self.clock);
            info!(
                "Dead reckoning started from ({:.6}, {:.6}), {:.2} m/s",
                last_fix.position.latitude, last_fix.position.longitude, last_fix.speed
            );
        }
        true
    }

    pub fn deactivate(&mut self) {
        if self.active {
            info!("Dead reckoning stopped after {:.1}s", self.elapsed_secs().unwrap_or(0.0));
        }
        self.active = false;
        self.activated_at = None;
    }

    pub fn step(&mut self, inertial: &InertialSample, dt: f64) -> FusionResult<DeadReckoningSnapshot> {
        if !self.active {
            return Err(FusionError::Inactive);
        }
        let (Some(position), Some(last_fix)) = (self.position, self.last_fix) else {
            return Err(FusionError::Inactive);
        };
        let dt = check_dt(dt)?;
        if !inertial.is_finite() {
            warn!("Ignoring non-finite inertial input: {:?}", inertial);
        }
        let inertial = &inertial.finite();
        self.clock += dt;

        let mut delta_yaw = 0.0;
        if let Some(attitude) = inertial.attitude {
            if let Some(prev_yaw) = self.last_yaw {
                delta_yaw = wrap_angle(attitude.yaw - prev_yaw);
                self.heading += delta_yaw;
            }
            self.last_yaw = Some(attitude.yaw);
        }

        // Forward is device y, right is device x
        let mut accel_ne = AccelNe::zeros();
        if let Some(accel) = inertial.acceleration {
            accel_ne = body_to_ne(accel.y, accel.x, self.heading);
            let threshold = self.config.motion_accel_threshold;
            if accel.x.abs() > threshold || accel.y.abs() > threshold {
                let velocity = self.velocity + accel_ne * (self.config.gravity * dt);
                if velocity.iter().all(|v| v.is_finite()) {
                    self.velocity = velocity;
                }
            }
        }

        self.velocity *= self.config.velocity_decay;

        let (moved, (delta_lat, delta_lon)) = geo::integrate_velocity(position, self.velocity, dt);
        self.position = Some(moved);

        Ok(DeadReckoningSnapshot {
            position: moved,
            speed: self.velocity.norm(),
            heading_deg: self.heading.to_degrees().rem_euclid(360.0),
            elapsed_secs: self.elapsed_secs().unwrap_or(0.0),
            last_fix,
            debug: DeadReckoningDebug {
                velocity_north: self.velocity.x,
                velocity_east: self.velocity.y,
                delta_yaw,
                accel_north: accel_ne.x,
                accel_east: accel_ne.y,
                delta_lat,
                delta_lon,
            },
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn elapsed_secs(&self) -> Option<f64> {
        self.activated_at.map(|t| self.clock - t)
    }

    pub fn position(&self) -> Option<GeoPoint> {
        self.position
    }

    pub fn last_fix(&self) -> Option<&LastFix> {
        self.last_fix.as_ref()
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{latlon_to_meters, EARTH_RADIUS_M};
    use crate::types::{Acceleration, Attitude};
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn moving_fix(speed: f64, course: f64) -> FixSample {
        FixSample::new(100.0, 35.0, 139.0, 5.0).with_motion(speed, course)
    }

    #[test]
    fn test_step_requires_activation() {
        let mut dr = DeadReckoning::default();
        assert!(!dr.activate());
        assert_eq!(dr.step(&InertialSample::empty(), 0.1), Err(FusionError::Inactive));

        dr.update_fix(&moving_fix(10.0, 0.0)).unwrap();
        assert_eq!(dr.step(&InertialSample::empty(), 0.1), Err(FusionError::Inactive));
        assert!(dr.activate());
        assert!(dr.is_active());
        assert!(dr.step(&InertialSample::empty(), 0.0).is_err());
    }

    #[test]
    fn test_coasts_with_decay() {
        let mut dr = DeadReckoning::default();
        dr.update_fix(&moving_fix(10.0, 0.0)).unwrap();
        dr.activate();

        let snap = dr.step(&InertialSample::empty(), 1.0).unwrap();
        assert_abs_diff_eq!(snap.speed, 9.95, epsilon = 1e-12);
        assert_abs_diff_eq!(snap.debug.delta_lat, (9.95 / EARTH_RADIUS_M).to_degrees(), epsilon = 1e-15);
        assert_abs_diff_eq!(snap.debug.delta_lon, 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(snap.elapsed_secs, 1.0);
        assert_eq!(snap.last_fix.timestamp, 100.0);

        let snap = dr.step(&InertialSample::empty(), 1.0).unwrap();
        assert_abs_diff_eq!(snap.speed, 9.95 * 0.995, epsilon = 1e-12);
        assert_abs_diff_eq!(snap.elapsed_secs, 2.0);
    }

    #[test]
    fn test_non_finite_inertial_is_ignored() {
        let mut dr = DeadReckoning::default();
        dr.update_fix(&moving_fix(10.0, 0.0)).unwrap();
        dr.activate();

        let bad = InertialSample::new(
            Some(Acceleration::new(f64::NAN, 0.3, 0.0)),
            Some(Attitude::new(0.0, 0.0, f64::INFINITY)),
        );
        let snap = dr.step(&bad, 1.0).unwrap();
        assert!(snap.position.validate().is_ok());
        assert_abs_diff_eq!(snap.speed, 9.95, epsilon = 1e-12);
        assert_abs_diff_eq!(snap.heading_deg, 0.0, epsilon = 1e-12);
        assert_eq!(snap.debug.delta_yaw, 0.0);

        let snap = dr.step(&InertialSample::empty(), 1.0).unwrap();
        assert!(snap.position.validate().is_ok());
        assert_abs_diff_eq!(snap.speed, 9.95 * 0.995, epsilon = 1e-12);
    }

    #[test]
    fn test_acceleration_uses_current_heading() {
        let mut dr = DeadReckoning::default();
        dr.update_fix(&moving_fix(0.0, 90.0)).unwrap();
        dr.activate();

        // Pitch is ignored entirely
        let push = InertialSample::new(
            Some(Acceleration::new(0.0, 0.1, 0.0)),
            Some(Attitude::new(0.0, 0.7, 1.0)),
        );
        let snap = dr.step(&push, 0.1).unwrap();
        assert_abs_diff_eq!(snap.debug.accel_north, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(snap.debug.accel_east, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(snap.debug.velocity_east, 0.1 * 9.81 * 0.1 * 0.995, epsilon = 1e-12);
        assert_abs_diff_eq!(snap.heading_deg, 90.0, epsilon = 1e-9);

        let origin = GeoPoint { latitude: 35.0, longitude: 139.0 };
        let (east, north) = latlon_to_meters(snap.position, origin);
        assert!(east > 0.0);
        assert_abs_diff_eq!(north, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_small_acceleration_ignored() {
        let mut dr = DeadReckoning::default();
        dr.update_fix(&moving_fix(2.0, 0.0)).unwrap();
        dr.activate();
        let jitter = InertialSample::new(Some(Acceleration::new(0.04, -0.03, 0.5)), None);
        let snap = dr.step(&jitter, 0.1).unwrap();
        assert_abs_diff_eq!(snap.speed, 2.0 * 0.995, epsilon = 1e-12);
        assert!(snap.debug.accel_north.abs() > 0.0);
    }

    #[test]
    fn test_yaw_delta_wraps() {
        let mut dr = DeadReckoning::default();
        dr.update_fix(&moving_fix(1.0, 0.0)).unwrap();
        dr.activate();
        dr.step(&InertialSample::new(None, Some(Attitude::new(0.0, 0.0, -3.1))), 0.1).unwrap();
        let snap = dr
            .step(&InertialSample::new(None, Some(Attitude::new(0.0, 0.0, 3.1))), 0.1)
            .unwrap();
        assert_abs_diff_eq!(snap.debug.delta_yaw, 6.2 - 2.0 * PI, epsilon = 1e-12);
        assert_abs_diff_eq!(snap.heading_deg, (6.2 - 2.0 * PI).to_degrees() + 360.0, epsilon = 1e-9);
    }

    #[test]
    fn test_update_fix_deactivates() {
        let mut dr = DeadReckoning::default();
        dr.update_fix(&moving_fix(5.0, 45.0)).unwrap();
        dr.activate();
        dr.step(&InertialSample::empty(), 0.5).unwrap();

        let fresh = FixSample::new(200.0, 35.01, 139.01, 4.0);
        dr.update_fix(&fresh).unwrap();
        assert!(!dr.is_active());
        assert_eq!(dr.elapsed_secs(), None);
        assert_eq!(dr.position(), Some(fresh.position()));

        // Unknown speed/course: starts from rest
        dr.activate();
        let snap = dr.step(&InertialSample::empty(), 1.0).unwrap();
        assert_eq!(snap.speed, 0.0);
        assert_eq!(snap.position, fresh.position());
        assert_abs_diff_eq!(snap.heading_deg, 45.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_fix_rejected() {
        let mut dr = DeadReckoning::default();
        assert!(dr.update_fix(&FixSample::new(0.0, -95.0, 0.0, 5.0)).is_err());
        assert!(dr.last_fix().is_none());
        assert!(!dr.activate());
    }
}
