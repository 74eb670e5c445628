// fusion_engine.rs: GPS/INS complementary filter with memory-track extrapolation
//
// Heuristic gains, scalar uncertainty proxies. A fix corrects position and
// velocity with a weight derived from its accuracy; between fixes the state is
// extrapolated either from a remembered GPS velocity (short outages during
// steady motion) or from gravity-removed acceleration.

use std::f64::consts::PI;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{check_dt, FusionError, FusionResult};
use crate::geo::{self, wrap_angle};
use crate::track::{Track, TrackIndex, TrackSource};
use crate::types::{
    body_to_ne, clamp_norm, course_to_ne, AccelNe, FixSample, GeoPoint, InertialSample, VelocityNe,
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    // ── Fix gating ──
    /// Below this accuracy a fix refreshes the remembered velocity
    pub good_accuracy_m: f64,
    /// At or above this accuracy (or invalid) a fix is skipped
    pub degrade_accuracy_m: f64,
    /// Position weight is `1 / (1 + accuracy / accuracy_scale_m)`
    pub accuracy_scale_m: f64,

    // ── Velocity correction ──
    pub velocity_update_min_speed: f64,
    /// Velocity weight is `position weight * velocity_blend_scale`
    pub velocity_blend_scale: f64,

    // ── Memory track ──
    pub motion_speed_threshold: f64,
    pub memory_decay: f64,
    pub memory_max_duration_secs: f64,

    // ── Inertial extrapolation ──
    /// |a| below this (g) counts as stationary
    pub zupt_accel_threshold: f64,
    pub zupt_velocity_decay: f64,
    /// |ax| or |ay| must exceed this (g) to be integrated
    pub motion_accel_threshold: f64,
    pub velocity_decay: f64,
    pub max_speed: f64,
    pub gravity: f64,
    /// heading = offset - yaw
    pub yaw_heading_offset: f64,

    // ── Uncertainty proxies ──
    pub initial_position_uncertainty: f64,
    pub initial_velocity_uncertainty: f64,
    pub position_uncertainty_growth: f64,
    pub velocity_uncertainty_growth: f64,
    pub position_uncertainty_blend: f64,
    pub velocity_uncertainty_shrink: f64,

    // ── Mode labelling ──
    pub fix_timeout_secs: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            good_accuracy_m: 15.0,
            degrade_accuracy_m: 30.0,
            accuracy_scale_m: 10.0,
            velocity_update_min_speed: 0.5,
            velocity_blend_scale: 0.5,
            motion_speed_threshold: 0.3,
            memory_decay: 0.98,
            memory_max_duration_secs: 60.0,
            zupt_accel_threshold: 0.08,
            zupt_velocity_decay: 0.8,
            motion_accel_threshold: 0.05,
            velocity_decay: 0.99,
            max_speed: 10.0,
            gravity: 9.81,
            yaw_heading_offset: 3.0 * PI / 2.0,
            initial_position_uncertainty: 10.0,
            initial_velocity_uncertainty: 1.0,
            position_uncertainty_growth: 0.1,
            velocity_uncertainty_growth: 0.05,
            position_uncertainty_blend: 0.5,
            velocity_uncertainty_shrink: 0.9,
            fix_timeout_secs: 5.0,
        }
    }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Estimator mode. `InertialOnly` means "not locked to fixes and not eligible
/// for memory extrapolation".
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FusionMode {
    Locked,
    MemoryTrack { entered_at: f64 },
    InertialOnly,
}

impl FusionMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::MemoryTrack { .. } => "memory_track",
            Self::InertialOnly => "inertial_only",
        }
    }

    pub fn is_memory_track(&self) -> bool {
        matches!(self, Self::MemoryTrack { .. })
    }
}

/// Velocity remembered from the last good, moving fix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemoryState {
    pub velocity: VelocityNe,
    /// Radians clockwise from north
    pub heading: f64,
    pub speed: f64,
    /// Product of all decay factors applied since the memory was refreshed
    pub decay: f64,
}

impl Default for MemoryState {
    /// Nothing remembered
    fn default() -> Self {
        Self {
            velocity: VelocityNe::zeros(),
            heading: 0.0,
            speed: 0.0,
            decay: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NavigationState {
    pub position: GeoPoint,
    pub velocity: VelocityNe,
    /// Radians clockwise from north
    pub heading: f64,
    pub position_uncertainty: f64,
    pub velocity_uncertainty: f64,
    pub mode: FusionMode,
    pub memory: MemoryState,
    pub last_good_fix_at: Option<f64>,
    pub last_fix_at: f64,
}

impl NavigationState {
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }
}

/// Read-only view handed to renderers and loggers after each tick.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NavigationSnapshot {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub heading_deg: f64,
    pub velocity_north: f64,
    pub velocity_east: f64,
    pub position_uncertainty: f64,
    pub velocity_uncertainty: f64,
    pub mode: &'static str,
    pub memory_elapsed_secs: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FixOutcome {
    Initialized(TrackIndex),
    Fused {
        index: TrackIndex,
        weight: f64,
        velocity_weight: Option<f64>,
    },
    /// Degraded or invalid accuracy: position and velocity untouched
    Skipped { entered_memory_track: bool },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub index: TrackIndex,
    pub position: GeoPoint,
    pub speed: f64,
    /// Radians clockwise from north
    pub heading: f64,
    pub source: TrackSource,
    pub memory_elapsed_secs: Option<f64>,
}

// ─── The engine ──────────────────────────────────────────────────────────────

pub struct FusionEngine {
    config: FusionConfig,
    state: Option<NavigationState>,
    track: Track,

    // Previous attitude yaw, for heading deltas
    last_yaw: Option<f64>,

    // Session clock (seconds): fix times and accumulated dt
    clock: f64,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            state: None,
            track: Track::new(),
            last_yaw: None,
            clock: 0.0,
        }
    }

    /// Start tracking at `fix`: position from the fix, velocity and heading
    /// zeroed, mode locked.
    pub fn initialize(&mut self, fix: &FixSample) -> FusionResult<TrackIndex> {
        self.start(fix, fix.timestamp)
    }

    fn start(&mut self, fix: &FixSample, now: f64) -> FusionResult<TrackIndex> {
        let position = fix.position();
        position.validate()?;

        if now.is_finite() {
            self.clock = now;
        }
        self.last_yaw = None;
        self.state = Some(NavigationState {
            position,
            velocity: VelocityNe::zeros(),
            heading: 0.0,
            position_uncertainty: self.config.initial_position_uncertainty,
            velocity_uncertainty: self.config.initial_velocity_uncertainty,
            mode: FusionMode::Locked,
            memory: MemoryState::default(),
            last_good_fix_at: None,
            last_fix_at: self.clock,
        });
        info!("Fusion initialized at ({:.6}, {:.6})", position.latitude, position.longitude);
        Ok(self.track.push(position, TrackSource::Gps))
    }

    /// Measurement update. The first valid fix initializes the engine.
    pub fn apply_fix(&mut self, fix: &FixSample, now: f64) -> FusionResult<FixOutcome> {
        fix.position().validate()?;
        if !now.is_finite() {
            return Err(FusionError::NonFinite("fix time"));
        }

        let Some(state) = self.state.as_mut() else {
            let index = self.start(fix, now)?;
            return Ok(FixOutcome::Initialized(index));
        };
        let cfg = &self.config;
        self.clock = self.clock.max(now);

        let accuracy_ok = fix.accuracy_valid();

        // Good fix: refresh memory, leave memory track
        if accuracy_ok && fix.accuracy < cfg.good_accuracy_m {
            if let Some(velocity) = fix.velocity_ne() {
                if fix.speed > cfg.motion_speed_threshold {
                    state.memory = MemoryState {
                        velocity,
                        heading: fix.course.to_radians(),
                        speed: fix.speed,
                        decay: 1.0,
                    };
                }
            }
            state.last_good_fix_at = Some(now);

            if let FusionMode::MemoryTrack { entered_at } = state.mode {
                info!(
                    "Memory track exited after {:.1}s (accuracy {:.1} m)",
                    now - entered_at,
                    fix.accuracy
                );
                state.mode = FusionMode::Locked;
            }
        }

        // Degraded fix: never touches position/velocity
        if !accuracy_ok || fix.accuracy >= cfg.degrade_accuracy_m {
            let mut entered_memory_track = false;
            if !state.mode.is_memory_track() && state.memory.speed > cfg.motion_speed_threshold {
                state.mode = FusionMode::MemoryTrack { entered_at: now };
                entered_memory_track = true;
                info!(
                    "Memory track entered: accuracy {:.1} m, remembered {:.2} m/s @ {:.0}°",
                    fix.accuracy,
                    state.memory.speed,
                    state.memory.heading.to_degrees()
                );
            }
            debug!("Skipping fix with accuracy {:.1} m", fix.accuracy);
            return Ok(FixOutcome::Skipped { entered_memory_track });
        }

        let weight = 1.0 / (1.0 + fix.accuracy / cfg.accuracy_scale_m);
        state.position = GeoPoint {
            latitude: (1.0 - weight) * state.position.latitude + weight * fix.latitude,
            longitude: (1.0 - weight) * state.position.longitude + weight * fix.longitude,
        };

        let mut velocity_weight = None;
        if let Some(gps_velocity) = fix.velocity_ne() {
            if fix.speed > cfg.velocity_update_min_speed {
                let vw = weight * cfg.velocity_blend_scale;
                state.velocity = state.velocity * (1.0 - vw) + gps_velocity * vw;
                state.heading = fix.course.to_radians();
                velocity_weight = Some(vw);
            }
        }

        let blend = cfg.position_uncertainty_blend;
        state.position_uncertainty = blend * fix.accuracy + (1.0 - blend) * state.position_uncertainty;
        state.velocity_uncertainty *= cfg.velocity_uncertainty_shrink;

        if state.mode == FusionMode::InertialOnly {
            info!("Locked to fixes again (accuracy {:.1} m)", fix.accuracy);
            state.mode = FusionMode::Locked;
        }
        state.last_fix_at = now;

        debug!(
            "Fix fused: accuracy {:.1} m, weight {:.3}, velocity weight {:?}",
            fix.accuracy, weight, velocity_weight
        );
        let index = self.track.push(state.position, TrackSource::Fused);
        Ok(FixOutcome::Fused { index, weight, velocity_weight })
    }

    /// Prediction update over `dt` seconds.
    pub fn predict(&mut self, inertial: &InertialSample, dt: f64) -> FusionResult<Prediction> {
        let dt = check_dt(dt)?;
        let Some(state) = self.state.as_mut() else {
            return Err(FusionError::Uninitialized);
        };
        if !inertial.is_finite() {
            warn!("Ignoring non-finite inertial input: {:?}", inertial);
        }
        let inertial = &inertial.finite();
        let cfg = &self.config;
        self.clock += dt;

        let mut memory_elapsed = None;
        if let FusionMode::MemoryTrack { entered_at } = state.mode {
            let elapsed = self.clock - entered_at;
            if elapsed < cfg.memory_max_duration_secs && state.memory.speed > cfg.motion_speed_threshold {
                memory_elapsed = Some(elapsed);
            } else {
                info!(
                    "Memory track expired after {:.1}s (remembered speed {:.2} m/s)",
                    elapsed, state.memory.speed
                );
                // Stale memory must not re-arm on the next degraded fix
                state.memory = MemoryState::default();
                state.mode = FusionMode::InertialOnly;
            }
        } else if state.mode == FusionMode::Locked && self.clock - state.last_fix_at > cfg.fix_timeout_secs {
            debug!("No usable fix for {:.1}s, inertial only", self.clock - state.last_fix_at);
            state.mode = FusionMode::InertialOnly;
        }

        let (source, speed, heading) = if memory_elapsed.is_some() {
            if let Some(attitude) = inertial.attitude {
                state.memory.heading = cfg.yaw_heading_offset - attitude.yaw;
                self.last_yaw = Some(attitude.yaw);
            }

            let decay = cfg.memory_decay;
            state.memory.velocity *= decay;
            state.memory.speed *= decay;
            state.memory.decay *= decay;

            let velocity = course_to_ne(state.memory.speed, state.memory.heading);
            let (moved, _) = geo::integrate_velocity(state.position, velocity, dt);
            state.position = moved;

            (TrackSource::Memory, state.memory.speed, state.memory.heading)
        } else {
            let (roll, pitch, frame_heading) = match inertial.attitude {
                Some(attitude) => {
                    if let Some(prev_yaw) = self.last_yaw {
                        state.heading += wrap_angle(attitude.yaw - prev_yaw);
                    }
                    self.last_yaw = Some(attitude.yaw);
                    (attitude.roll, attitude.pitch, cfg.yaw_heading_offset - attitude.yaw)
                }
                None => (0.0, 0.0, state.heading),
            };

            if let Some(accel) = inertial.acceleration {
                let forward = accel.y * pitch.cos() - accel.z * pitch.sin();
                let right = accel.x * roll.cos();
                let accel_ne: AccelNe = body_to_ne(forward, right, frame_heading);

                if accel.magnitude() < cfg.zupt_accel_threshold {
                    state.velocity *= cfg.zupt_velocity_decay;
                } else if accel.x.abs() > cfg.motion_accel_threshold
                    || accel.y.abs() > cfg.motion_accel_threshold
                {
                    let velocity = state.velocity + accel_ne * (cfg.gravity * dt);
                    if velocity.iter().all(|v| v.is_finite()) {
                        state.velocity = velocity;
                    }
                }
            }

            state.velocity *= cfg.velocity_decay;
            state.velocity = clamp_norm(state.velocity, cfg.max_speed);

            let (moved, _) = geo::integrate_velocity(state.position, state.velocity, dt);
            state.position = moved;

            (TrackSource::Ins, state.velocity.norm(), state.heading)
        };

        state.position_uncertainty += cfg.position_uncertainty_growth * dt;
        state.velocity_uncertainty += cfg.velocity_uncertainty_growth * dt;

        let index = self.track.push(state.position, source);
        Ok(Prediction {
            index,
            position: state.position,
            speed,
            heading,
            source,
            memory_elapsed_secs: memory_elapsed,
        })
    }

    /// Drop all state and history and wait for a new first fix.
    pub fn reset(&mut self) {
        self.state = None;
        self.track.clear();
        self.last_yaw = None;
        self.clock = 0.0;
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Option<NavigationSnapshot> {
        let state = self.state.as_ref()?;
        let (speed, heading, memory_elapsed_secs) = match state.mode {
            FusionMode::MemoryTrack { entered_at } => {
                (state.memory.speed, state.memory.heading, Some(self.clock - entered_at))
            }
            _ => (state.speed(), state.heading, None),
        };
        Some(NavigationSnapshot {
            timestamp: self.clock,
            latitude: state.position.latitude,
            longitude: state.position.longitude,
            speed,
            heading_deg: heading.to_degrees().rem_euclid(360.0),
            velocity_north: state.velocity.x,
            velocity_east: state.velocity.y,
            position_uncertainty: state.position_uncertainty,
            velocity_uncertainty: state.velocity_uncertainty,
            mode: state.mode.label(),
            memory_elapsed_secs,
        })
    }

    pub fn state(&self) -> Option<&NavigationState> {
        self.state.as_ref()
    }

    pub fn mode(&self) -> Option<FusionMode> {
        self.state.as_ref().map(|s| s.mode)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }
}
