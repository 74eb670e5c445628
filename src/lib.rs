//! GPS/INS navigation core
//!
//! Blends intermittent satellite fixes with inertial samples into a
//! continuous position track, extrapolating through short outages from a
//! remembered velocity and through long ones from acceleration. A separate
//! dead-reckoning fallback and a barometric altitude channel run off the same
//! tick. [`sensor_fusion::Navigator`] wires them together.

pub mod error;
pub mod filters;
pub mod geo;
pub mod health_monitor;
pub mod sensor_fusion;
pub mod track;
pub mod types;

pub use error::{FusionError, FusionResult};
pub use filters::altitude::{AltitudeConfig, AltitudeEstimator};
pub use filters::dead_reckoning::{DeadReckoning, DeadReckoningConfig, DeadReckoningSnapshot};
pub use filters::fusion_engine::{
    FixOutcome, FusionConfig, FusionEngine, FusionMode, NavigationSnapshot, NavigationState,
    Prediction,
};
pub use sensor_fusion::{DisplaySource, FusionEvent, Navigator, NavigatorConfig, TickInput, TickOutput};
pub use track::{Track, TrackEntry, TrackIndex, TrackSource};
pub use types::{Acceleration, Attitude, BaroSample, FixQuality, FixSample, GeoPoint, InertialSample};
