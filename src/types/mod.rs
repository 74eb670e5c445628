pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

use crate::error::{FusionError, FusionResult};

/// Sentinel used by fix producers for "not reported" speed, course and accuracy.
pub const UNKNOWN: f64 = -1.0;

fn unknown() -> f64 {
    UNKNOWN
}

/// Latitude/longitude pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting anything outside [-90,90] x [-180,180].
    /// Out-of-range values are never clamped.
    pub fn new(latitude: f64, longitude: f64) -> FusionResult<Self> {
        let point = Self { latitude, longitude };
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> FusionResult<()> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(FusionError::NonFinite("coordinate"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(FusionError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }
        Ok(())
    }
}

/// One satellite fix.
///
/// Negative `speed`, `course` and `accuracy` follow the platform convention
/// for "unknown"/"invalid" and are interpreted by the accessors below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixSample {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed, m/s
    #[serde(default = "unknown")]
    pub speed: f64,
    /// Course over ground, degrees clockwise from north
    #[serde(default = "unknown")]
    pub course: f64,
    /// Horizontal accuracy, meters
    #[serde(default = "unknown")]
    pub accuracy: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default = "unknown")]
    pub vertical_accuracy: f64,
}

impl FixSample {
    pub fn new(timestamp: f64, latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            speed: UNKNOWN,
            course: UNKNOWN,
            accuracy,
            altitude: None,
            vertical_accuracy: UNKNOWN,
        }
    }

    pub fn with_motion(mut self, speed: f64, course_deg: f64) -> Self {
        self.speed = speed;
        self.course = course_deg;
        self
    }

    pub fn with_altitude(mut self, altitude: f64, vertical_accuracy: f64) -> Self {
        self.altitude = Some(altitude);
        self.vertical_accuracy = vertical_accuracy;
        self
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint { latitude: self.latitude, longitude: self.longitude }
    }

    /// Invalid accuracy is treated as maximally degraded, never as zero.
    pub fn accuracy_valid(&self) -> bool {
        self.accuracy.is_finite() && self.accuracy >= 0.0
    }

    pub fn speed_known(&self) -> bool {
        self.speed.is_finite() && self.speed >= 0.0
    }

    pub fn course_known(&self) -> bool {
        self.course.is_finite() && self.course >= 0.0
    }

    /// North/east velocity implied by course and speed, when both are known.
    pub fn velocity_ne(&self) -> Option<VelocityNe> {
        if self.speed_known() && self.course_known() {
            Some(course_to_ne(self.speed, self.course.to_radians()))
        } else {
            None
        }
    }

    pub fn quality(&self) -> FixQuality {
        FixQuality::from_accuracy(self.accuracy)
    }

    pub fn vertical_accuracy_valid(&self) -> bool {
        self.vertical_accuracy.is_finite() && self.vertical_accuracy >= 0.0
    }
}

/// Gravity-removed linear acceleration in device axes, units of g.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Acceleration {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.magnitude().is_finite()
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Device attitude in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Attitude {
    pub fn new(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self { roll, pitch, yaw }
    }

    pub fn is_finite(&self) -> bool {
        self.roll.is_finite() && self.pitch.is_finite() && self.yaw.is_finite()
    }
}

/// One inertial reading. Either half may be missing on a given tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InertialSample {
    pub acceleration: Option<Acceleration>,
    pub attitude: Option<Attitude>,
}

impl InertialSample {
    pub fn new(acceleration: Option<Acceleration>, attitude: Option<Attitude>) -> Self {
        Self { acceleration, attitude }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// True when every half that is present holds only finite values.
    pub fn is_finite(&self) -> bool {
        self.acceleration.map_or(true, |a| a.is_finite()) && self.attitude.map_or(true, |a| a.is_finite())
    }

    /// Copy with non-finite halves dropped, so they read as missing input.
    pub fn finite(&self) -> Self {
        Self {
            acceleration: self.acceleration.filter(Acceleration::is_finite),
            attitude: self.attitude.filter(Attitude::is_finite),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaroSample {
    /// Altitude change since the barometer started, meters
    pub relative_altitude: f64,
}

/// Accuracy band of a fix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixQuality {
    Invalid,
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl FixQuality {
    pub fn from_accuracy(accuracy: f64) -> Self {
        if accuracy.is_nan() || accuracy < 0.0 {
            Self::Invalid
        } else if accuracy < 5.0 {
            Self::Excellent
        } else if accuracy < 15.0 {
            Self::Good
        } else if accuracy < 30.0 {
            Self::Fair
        } else if accuracy < 100.0 {
            Self::Poor
        } else {
            Self::VeryPoor
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::VeryPoor => "very_poor",
        }
    }
}
