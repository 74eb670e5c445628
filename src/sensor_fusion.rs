// sensor_fusion.rs: Per-tick driver for the navigation core
//
// Everything in this module is independent of:
//   - sensor acquisition and scheduling
//   - File I/O, rendering, map tiles
//
// One `tick` takes the latest inertial sample (always), a satellite fix and a
// barometer reading (when present) and advances the fusion engine, the
// dead-reckoning fallback and the altitude estimator in a fixed order. Replay
// and simulation both go through here, so recorded sessions reproduce the
// live behaviour exactly.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::filters::altitude::{AltitudeConfig, AltitudeEstimator};
use crate::filters::dead_reckoning::{DeadReckoning, DeadReckoningConfig, DeadReckoningSnapshot};
use crate::filters::fusion_engine::{
    FixOutcome, FusionConfig, FusionEngine, FusionMode, NavigationSnapshot,
};
use crate::health_monitor::{GpsSignalMonitor, SignalStatus, SignalTransition};
use crate::track::Track;
use crate::types::{BaroSample, FixQuality, FixSample, InertialSample};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    pub fusion: FusionConfig,
    pub dead_reckoning: DeadReckoningConfig,
    pub altitude: AltitudeConfig,
    /// No fresh fix for this long means the signal is lost
    pub signal_timeout_secs: f64,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            fusion: FusionConfig::default(),
            dead_reckoning: DeadReckoningConfig::default(),
            altitude: AltitudeConfig::default(),
            signal_timeout_secs: 5.0,
        }
    }
}

impl NavigatorConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FusionEvent {
    Initialized { latitude: f64, longitude: f64 },
    FixRejected { reason: String },
    FixSkipped { accuracy: f64 },
    MemoryTrackEntered { speed: f64, heading_deg: f64 },
    MemoryTrackExited { after_secs: f64 },
    MemoryTrackExpired { after_secs: f64 },
    SignalAcquired,
    SignalLost { silence_secs: f64 },
    SignalRecovered,
    DeadReckoningStarted { latitude: f64, longitude: f64 },
    DeadReckoningStopped { elapsed_secs: f64 },
}

impl FusionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "initialized",
            Self::FixRejected { .. } => "fix_rejected",
            Self::FixSkipped { .. } => "fix_skipped",
            Self::MemoryTrackEntered { .. } => "memory_track_entered",
            Self::MemoryTrackExited { .. } => "memory_track_exited",
            Self::MemoryTrackExpired { .. } => "memory_track_expired",
            Self::SignalAcquired => "signal_acquired",
            Self::SignalLost { .. } => "signal_lost",
            Self::SignalRecovered => "signal_recovered",
            Self::DeadReckoningStarted { .. } => "dead_reckoning_started",
            Self::DeadReckoningStopped { .. } => "dead_reckoning_stopped",
        }
    }
}

// ─── Tick I/O ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickInput {
    /// Caller clock, seconds
    pub timestamp: f64,
    /// Time since the previous tick
    pub dt: f64,
    pub inertial: InertialSample,
    /// Latest fix; may repeat the previous one, only fresh fixes are applied
    pub fix: Option<FixSample>,
    pub baro: Option<BaroSample>,
}

/// Colour class of the integrated track for one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplaySource {
    GpsExcellent,
    GpsGood,
    GpsFair,
    Fusion,
    Memory,
    Ins,
}

impl DisplaySource {
    pub fn label(self) -> &'static str {
        match self {
            Self::GpsExcellent => "gps_excellent",
            Self::GpsGood => "gps_good",
            Self::GpsFair => "gps_fair",
            Self::Fusion => "fusion",
            Self::Memory => "memory",
            Self::Ins => "ins",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TickOutput {
    pub timestamp: f64,
    pub navigation: Option<NavigationSnapshot>,
    pub altitude: Option<f64>,
    pub vertical_velocity: f64,
    pub dead_reckoning: Option<DeadReckoningSnapshot>,
    pub signal: SignalStatus,
    pub display_source: DisplaySource,
    pub fix_quality: Option<FixQuality>,
    pub events: Vec<FusionEvent>,
}

// ─── The navigator ───────────────────────────────────────────────────────────

pub struct Navigator {
    config: NavigatorConfig,
    engine: FusionEngine,
    dead_reckoning: DeadReckoning,
    altitude: AltitudeEstimator,
    monitor: GpsSignalMonitor,

    // Quality of the last fresh fix
    last_fix_quality: Option<FixQuality>,
    ticks: u64,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(NavigatorConfig::default())
    }
}

impl Navigator {
    pub fn new(config: NavigatorConfig) -> Self {
        Self {
            engine: FusionEngine::new(config.fusion.clone()),
            dead_reckoning: DeadReckoning::new(config.dead_reckoning.clone()),
            altitude: AltitudeEstimator::new(config.altitude.clone()),
            monitor: GpsSignalMonitor::new(config.signal_timeout_secs),
            config,
            last_fix_quality: None,
            ticks: 0,
        }
    }

    /// Advance everything by one tick: watchdog, measurement update,
    /// dead-reckoning fallback, prediction, altitude. A fix is always applied
    /// before the prediction of the same tick.
    pub fn tick(&mut self, input: &TickInput) -> TickOutput {
        let mut events = Vec::new();
        self.ticks += 1;

        // ── Watchdog ──
        let check = self.monitor.observe(input.fix.as_ref(), input.timestamp);
        match check.transition {
            Some(SignalTransition::Acquired) => events.push(FusionEvent::SignalAcquired),
            Some(SignalTransition::Lost) => events.push(FusionEvent::SignalLost {
                silence_secs: check.silence_secs.unwrap_or(0.0),
            }),
            Some(SignalTransition::Recovered) => events.push(FusionEvent::SignalRecovered),
            None => {}
        }

        // ── Measurement update ──
        let fresh_fix = input.fix.as_ref().filter(|_| check.fresh);
        if let Some(fix) = fresh_fix {
            self.last_fix_quality = Some(fix.quality());
            self.apply_fix(fix, input.timestamp, &mut events);
        }

        // ── Dead-reckoning fallback ──
        let mut dead_reckoning = None;
        if self.monitor.is_lost() {
            if !self.dead_reckoning.is_active() && self.dead_reckoning.activate() {
                if let Some(last) = self.dead_reckoning.last_fix() {
                    events.push(FusionEvent::DeadReckoningStarted {
                        latitude: last.position.latitude,
                        longitude: last.position.longitude,
                    });
                }
            }
            if self.dead_reckoning.is_active() {
                match self.dead_reckoning.step(&input.inertial, input.dt) {
                    Ok(snapshot) => dead_reckoning = Some(snapshot),
                    Err(e) => debug!("Dead reckoning step skipped: {}", e),
                }
            }
        }

        // ── Prediction ──
        if self.engine.is_initialized() {
            let before = self.engine.mode();
            match self.engine.predict(&input.inertial, input.dt) {
                Ok(_) => {
                    if let (Some(FusionMode::MemoryTrack { entered_at }), Some(FusionMode::InertialOnly)) =
                        (before, self.engine.mode())
                    {
                        events.push(FusionEvent::MemoryTrackExpired {
                            after_secs: self.engine.clock() - entered_at,
                        });
                    }
                }
                Err(e) => debug!("Prediction skipped: {}", e),
            }
        }

        // ── Altitude ──
        let (gps_altitude, gps_vertical_accuracy) = match fresh_fix {
            Some(fix) => (
                fix.altitude,
                Some(fix.vertical_accuracy).filter(|_| fix.vertical_accuracy_valid()),
            ),
            None => (None, None),
        };
        let altitude = self.altitude.update(
            gps_altitude,
            gps_vertical_accuracy,
            input.baro.map(|b| b.relative_altitude),
            input.inertial.acceleration.map(|a| a.z),
            input.dt,
        );

        TickOutput {
            timestamp: input.timestamp,
            navigation: self.engine.snapshot(),
            altitude,
            vertical_velocity: self.altitude.vertical_velocity(),
            dead_reckoning,
            signal: check.status,
            display_source: self.display_source(check.status),
            fix_quality: self.last_fix_quality,
            events,
        }
    }

    fn apply_fix(&mut self, fix: &FixSample, now: f64, events: &mut Vec<FusionEvent>) {
        let before = self.engine.mode();
        match self.engine.apply_fix(fix, now) {
            Ok(FixOutcome::Initialized(_)) => events.push(FusionEvent::Initialized {
                latitude: fix.latitude,
                longitude: fix.longitude,
            }),
            Ok(FixOutcome::Skipped { entered_memory_track }) => {
                events.push(FusionEvent::FixSkipped { accuracy: fix.accuracy });
                if entered_memory_track {
                    if let Some(state) = self.engine.state() {
                        events.push(FusionEvent::MemoryTrackEntered {
                            speed: state.memory.speed,
                            heading_deg: state.memory.heading.to_degrees().rem_euclid(360.0),
                        });
                    }
                }
            }
            Ok(FixOutcome::Fused { .. }) => {}
            Err(e) => {
                warn!("Fix rejected: {}", e);
                events.push(FusionEvent::FixRejected { reason: e.to_string() });
                return;
            }
        }

        if let (Some(FusionMode::MemoryTrack { entered_at }), Some(FusionMode::Locked)) =
            (before, self.engine.mode())
        {
            events.push(FusionEvent::MemoryTrackExited { after_secs: now - entered_at });
        }

        let was_active = self.dead_reckoning.is_active();
        let elapsed = self.dead_reckoning.elapsed_secs();
        match self.dead_reckoning.update_fix(fix) {
            Ok(()) if was_active => events.push(FusionEvent::DeadReckoningStopped {
                elapsed_secs: elapsed.unwrap_or(0.0),
            }),
            Ok(()) => {}
            Err(e) => debug!("Dead reckoning kept its last fix: {}", e),
        }
    }

    fn display_source(&self, signal: SignalStatus) -> DisplaySource {
        let in_memory = self.engine.mode().map(|m| m.is_memory_track()).unwrap_or(false);
        match (signal, self.last_fix_quality) {
            (SignalStatus::Live, Some(FixQuality::Excellent)) => DisplaySource::GpsExcellent,
            (SignalStatus::Live, Some(FixQuality::Good)) => DisplaySource::GpsGood,
            (SignalStatus::Live, Some(FixQuality::Fair)) => DisplaySource::GpsFair,
            (SignalStatus::Live, _) if in_memory => DisplaySource::Memory,
            (SignalStatus::Live, _) => DisplaySource::Fusion,
            _ if in_memory => DisplaySource::Memory,
            _ => DisplaySource::Ins,
        }
    }

    /// Drop all estimator state and start a new session.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn engine(&self) -> &FusionEngine {
        &self.engine
    }

    pub fn track(&self) -> &Track {
        self.engine.track()
    }

    pub fn dead_reckoning(&self) -> &DeadReckoning {
        &self.dead_reckoning
    }

    pub fn altitude(&self) -> &AltitudeEstimator {
        &self.altitude
    }

    pub fn monitor(&self) -> &GpsSignalMonitor {
        &self.monitor
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }
}
