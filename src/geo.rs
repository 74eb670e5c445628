//! Coordinate and distance primitives
//!
//! All estimators move positions with the same flat-earth (equirectangular)
//! step so that the fusion engine, dead reckoning and the tests agree to the
//! last bit on what "integrate this velocity for dt" means.

use std::f64::consts::{PI, TAU};

use crate::types::{GeoPoint, VelocityNe};

/// Equatorial radius used for velocity integration (WGS84 semi-major axis).
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Mean radius used for great-circle distances.
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    MEAN_EARTH_RADIUS_M * c
}

/// Latitude/longitude deltas (degrees) for a north/east displacement in
/// meters at `latitude`.
pub fn displacement_to_degrees(latitude: f64, north_m: f64, east_m: f64) -> (f64, f64) {
    // Keep the longitude scale finite at the poles
    let cos_lat = latitude.to_radians().cos().abs().max(1e-12);
    let d_lat = (north_m / EARTH_RADIUS_M).to_degrees();
    let d_lon = (east_m / (EARTH_RADIUS_M * cos_lat)).to_degrees();
    (d_lat, d_lon)
}

/// Move `position` by `velocity * dt` and return the new point together
/// with the applied (d_lat, d_lon) in degrees. A displacement that overflows
/// leaves the position where it was.
pub fn integrate_velocity(position: GeoPoint, velocity: VelocityNe, dt: f64) -> (GeoPoint, (f64, f64)) {
    let (d_lat, d_lon) = displacement_to_degrees(position.latitude, velocity.x * dt, velocity.y * dt);
    if !(d_lat.is_finite() && d_lon.is_finite()) {
        return (position, (0.0, 0.0));
    }
    let moved = GeoPoint {
        latitude: (position.latitude + d_lat).clamp(-90.0, 90.0),
        longitude: wrap_longitude(position.longitude + d_lon),
    };
    (moved, (d_lat, d_lon))
}

/// Wrap an angle into (-π, π].
pub fn wrap_angle(angle: f64) -> f64 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Wrap a longitude into [-180, 180].
pub fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        ((lon + 180.0) % 360.0 + 360.0) % 360.0 - 180.0
    }
}

/// Convert lat/lon to local (east, north) meters around an origin using the
/// equirectangular approximation.
pub fn latlon_to_meters(point: GeoPoint, origin: GeoPoint) -> (f64, f64) {
    let d_lat = (point.latitude - origin.latitude).to_radians();
    let d_lon = (point.longitude - origin.longitude).to_radians();
    let x = EARTH_RADIUS_M * d_lon * origin.latitude.to_radians().cos();
    let y = EARTH_RADIUS_M * d_lat;
    (x, y)
}

/// Sum of great-circle legs along a sequence of points.
pub fn path_length<I>(points: I) -> f64
where
    I: IntoIterator<Item = GeoPoint>,
{
    let mut iter = points.into_iter();
    let Some(mut prev) = iter.next() else {
        return 0.0;
    };
    let mut total = 0.0;
    for p in iter {
        total += haversine_distance(prev, p);
        prev = p;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector2;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint { latitude: lat, longitude: lon }
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_distance(p(0.0, 0.0), p(1.0, 0.0));
        assert_abs_diff_eq!(d, MEAN_EARTH_RADIUS_M * PI / 180.0, epsilon = 1e-6);
        assert_eq!(haversine_distance(p(35.0, 139.0), p(35.0, 139.0)), 0.0);
    }

    #[test]
    fn test_wrap_angle_crossing() {
        // Yaw going 3.13 -> -3.13 crosses +π: the step is a small positive turn
        let delta = wrap_angle(-3.13 - 3.13);
        assert_abs_diff_eq!(delta, TAU - 6.26, epsilon = 1e-12);
        assert!(delta.abs() < 0.03);

        assert_abs_diff_eq!(wrap_angle(3.13 - -3.13), 6.26 - TAU, epsilon = 1e-12);
        assert_eq!(wrap_angle(PI), PI);
        assert_eq!(wrap_angle(-PI), PI);
        assert_abs_diff_eq!(wrap_angle(0.5), 0.5);
        assert_abs_diff_eq!(wrap_angle(5.0 * TAU + 0.25), 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_integrate_velocity_overflow_holds_position() {
        let start = p(35.0, 139.0);
        let (moved, delta) = integrate_velocity(start, Vector2::new(f64::MAX, f64::MAX), 10.0);
        assert_eq!(moved, start);
        assert_eq!(delta, (0.0, 0.0));
    }

    #[test]
    fn test_integrate_velocity_north() {
        let start = p(35.0, 139.0);
        let (moved, (d_lat, d_lon)) = integrate_velocity(start, Vector2::new(10.0, 0.0), 1.0);
        assert_abs_diff_eq!(d_lat, (10.0 / EARTH_RADIUS_M).to_degrees(), epsilon = 1e-15);
        assert_eq!(d_lon, 0.0);
        assert_abs_diff_eq!(moved.latitude, 35.0 + d_lat, epsilon = 1e-15);
        assert_abs_diff_eq!(haversine_distance(start, moved), 10.0, epsilon = 0.02);
    }

    #[test]
    fn test_integrate_velocity_east_scales_with_latitude() {
        let (_, (_, d_lon_eq)) = integrate_velocity(p(0.0, 0.0), Vector2::new(0.0, 5.0), 1.0);
        let (_, (_, d_lon_60)) = integrate_velocity(p(60.0, 0.0), Vector2::new(0.0, 5.0), 1.0);
        assert_abs_diff_eq!(d_lon_60, d_lon_eq * 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wrap_longitude() {
        assert_eq!(wrap_longitude(179.0), 179.0);
        assert_abs_diff_eq!(wrap_longitude(181.0), -179.0, epsilon = 1e-9);
        assert_abs_diff_eq!(wrap_longitude(-181.0), 179.0, epsilon = 1e-9);
    }

    #[test]
    fn test_latlon_to_meters_roundtrip_scale() {
        let origin = p(35.0, 139.0);
        let (d_lat, d_lon) = displacement_to_degrees(35.0, 100.0, -50.0);
        let (x, y) = latlon_to_meters(p(35.0 + d_lat, 139.0 + d_lon), origin);
        assert_abs_diff_eq!(y, 100.0, epsilon = 1e-6);
        assert_abs_diff_eq!(x, -50.0, epsilon = 1e-6);
    }

    #[test]
    fn test_path_length() {
        assert_eq!(path_length(Vec::<GeoPoint>::new()), 0.0);
        assert_eq!(path_length(vec![p(1.0, 1.0)]), 0.0);
        let legs = path_length(vec![p(0.0, 0.0), p(0.5, 0.0), p(1.0, 0.0)]);
        assert_abs_diff_eq!(legs, haversine_distance(p(0.0, 0.0), p(1.0, 0.0)), epsilon = 1e-6);
    }
}
