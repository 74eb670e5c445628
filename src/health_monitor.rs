use log::{debug, info};
use serde::Serialize;

use crate::types::FixSample;

/// Satellite signal state as seen by the watchdog
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    /// No fix seen yet
    Waiting,
    Live,
    /// No fresh fix within the silence threshold
    Lost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalTransition {
    Acquired,
    Lost,
    Recovered,
}

/// Result of one watchdog check
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignalCheck {
    /// The offered fix carries a timestamp not seen before
    pub fresh: bool,
    pub status: SignalStatus,
    pub transition: Option<SignalTransition>,
    pub silence_secs: Option<f64>,
}

/// Tracks whether satellite fixes keep arriving.
///
/// Time is whatever clock the caller ticks with (session seconds in replay,
/// wall seconds live), so the monitor is deterministic under test.
#[derive(Clone, Debug)]
pub struct GpsSignalMonitor {
    silence_threshold_secs: f64,
    last_fix_timestamp: Option<f64>,
    last_fresh_at: Option<f64>,
    status: SignalStatus,
    losses: u32,
}

impl GpsSignalMonitor {
    pub fn new(silence_threshold_secs: f64) -> Self {
        GpsSignalMonitor {
            silence_threshold_secs,
            last_fix_timestamp: None,
            last_fresh_at: None,
            status: SignalStatus::Waiting,
            losses: 0,
        }
    }

    /// Offer the latest fix (if any) at time `now`.
    pub fn observe(&mut self, fix: Option<&FixSample>, now: f64) -> SignalCheck {
        let fresh = match fix {
            Some(f) if f.timestamp.is_finite() => match self.last_fix_timestamp {
                Some(last) => f.timestamp > last,
                None => true,
            },
            _ => false,
        };
        if let (true, Some(f)) = (fresh, fix) {
            self.last_fix_timestamp = Some(f.timestamp);
            self.last_fresh_at = Some(now);
        } else if fix.is_some() {
            debug!("Stale fix ignored (timestamp not advancing)");
        }

        let silence_secs = self.time_since_last_fix(now);
        let status = match silence_secs {
            None => SignalStatus::Waiting,
            Some(s) if s > self.silence_threshold_secs => SignalStatus::Lost,
            Some(_) => SignalStatus::Live,
        };

        let transition = match (self.status, status) {
            (SignalStatus::Waiting, SignalStatus::Live) => Some(SignalTransition::Acquired),
            (SignalStatus::Live, SignalStatus::Lost) => {
                self.losses += 1;
                info!("GPS signal lost (silent {:.1}s)", silence_secs.unwrap_or(0.0));
                Some(SignalTransition::Lost)
            }
            (SignalStatus::Lost, SignalStatus::Live) => {
                info!("GPS signal recovered");
                Some(SignalTransition::Recovered)
            }
            _ => None,
        };
        self.status = status;

        SignalCheck { fresh, status, transition, silence_secs }
    }

    pub fn time_since_last_fix(&self, now: f64) -> Option<f64> {
        self.last_fresh_at.map(|t| (now - t).max(0.0))
    }

    pub fn status(&self) -> SignalStatus {
        self.status
    }

    pub fn is_lost(&self) -> bool {
        self.status == SignalStatus::Lost
    }

    pub fn loss_count(&self) -> u32 {
        self.losses
    }

    /// Format signal status for logging
    pub fn format_status(&self, now: f64) -> String {
        match self.status {
            SignalStatus::Waiting => "GPS … (waiting)".to_string(),
            SignalStatus::Live => "GPS ✓".to_string(),
            SignalStatus::Lost => format!(
                "GPS ⚠ (silent {:.1}s)",
                self.time_since_last_fix(now).unwrap_or(0.0)
            ),
        }
    }
}

impl Default for GpsSignalMonitor {
    fn default() -> Self {
        Self::new(5.0)
    }
}
