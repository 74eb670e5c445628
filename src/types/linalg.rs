//! Linear algebra aliases for the local navigation frame
//!
//! Velocities and accelerations are carried as 2-vectors in (north, east)
//! order. Headings are radians clockwise from north, the same frame as a
//! satellite course, so `Rotation2` maps a (forward, right) body pair
//! straight into (north, east).

use nalgebra::{Rotation2, Vector2};

// ===== Navigation frame =====
pub type VelocityNe = Vector2<f64>;  // (north, east) m/s
pub type AccelNe = Vector2<f64>;     // (north, east)

/// Rotate a (forward, right) body-frame pair into (north, east).
pub fn body_to_ne(forward: f64, right: f64, heading: f64) -> Vector2<f64> {
    Rotation2::new(heading) * Vector2::new(forward, right)
}

/// Decompose a speed along a course (radians from north) into north/east.
pub fn course_to_ne(speed: f64, course_rad: f64) -> VelocityNe {
    Vector2::new(speed * course_rad.cos(), speed * course_rad.sin())
}

/// Scale `v` down so its norm does not exceed `max_norm`.
pub fn clamp_norm(v: Vector2<f64>, max_norm: f64) -> Vector2<f64> {
    let norm = v.norm();
    if norm > max_norm && norm > 0.0 {
        v * (max_norm / norm)
    } else {
        v
    }
}
