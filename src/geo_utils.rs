//! Geographic primitives.
//!
//! Pure functions over WGS84 coordinates on a spherical earth model. Every
//! caller (simplifier, navigation, viewport) goes through these so that
//! bearings and distances agree across the crate.

use geo::{Bearing, Distance, Haversine, Point};

use crate::Coordinate;

/// Mean earth radius in meters, matching `geo`'s haversine model.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Distances at or below this are treated as coincident points.
const COINCIDENT_M: f64 = 1e-9;

fn to_point(c: &Coordinate) -> Point<f64> {
    Point::new(c.longitude, c.latitude)
}

/// Normalize an angle in degrees into [0, 360).
pub fn normalize_bearing(deg: f64) -> f64 {
    let b = deg.rem_euclid(360.0);
    // rem_euclid can round tiny negatives up to exactly 360
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

/// Great-circle distance in meters.
///
/// Symmetric, and exactly zero for identical coordinates.
pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    if a == b {
        return 0.0;
    }
    Haversine::distance(to_point(a), to_point(b))
}

/// Initial great-circle bearing from `a` to `b`, degrees in [0, 360).
///
/// Coincident points report 0.
pub fn bearing(a: &Coordinate, b: &Coordinate) -> f64 {
    if a == b {
        return 0.0;
    }
    normalize_bearing(Haversine::bearing(to_point(a), to_point(b)))
}

/// The opposite bearing, degrees in [0, 360).
pub fn reverse_bearing(bearing: f64) -> f64 {
    normalize_bearing(bearing + 180.0)
}

/// Signed change of heading from `prev` to `next`, degrees in (-180, 180].
///
/// Positive is a turn to the right.
pub fn turn(prev: f64, next: f64) -> f64 {
    let delta = (next - prev).rem_euclid(360.0);
    if delta > 180.0 {
        delta - 360.0
    } else {
        delta
    }
}

/// Signed lateral offset in meters of a point from a course line.
///
/// The course line has bearing `course` and ends at a reference point; the
/// point under test is `distance_to_ref` meters away from the reference and
/// sees it at `bearing_to_ref`. Positive results are right of course.
///
/// Returns `None` when the reference lies behind the point relative to the
/// course (bearings differ by more than 90°): the point has passed the
/// reference and has no projection onto the line.
pub fn cross_track_deviation(distance_to_ref: f64, course: f64, bearing_to_ref: f64) -> Option<f64> {
    if !distance_to_ref.is_finite() || !course.is_finite() || !bearing_to_ref.is_finite() {
        return None;
    }
    if distance_to_ref <= COINCIDENT_M {
        return Some(0.0);
    }
    let delta = turn(course, bearing_to_ref);
    if delta.abs() > 90.0 {
        return None;
    }
    let angular = distance_to_ref / EARTH_RADIUS_M;
    let xtk = (angular.sin() * (-delta).to_radians().sin()).asin() * EARTH_RADIUS_M;
    Some(xtk)
}

/// Bring a computed coordinate back into the WGS84 range.
pub fn clamp_coordinate(c: Coordinate) -> Coordinate {
    c.clamp()
}

/// Length of each consecutive leg of a polyline, in meters.
pub fn leg_lengths(points: &[Coordinate]) -> Vec<f64> {
    points.windows(2).map(|w| distance(&w[0], &w[1])).collect()
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[Coordinate]) -> f64 {
    points.windows(2).map(|w| distance(&w[0], &w[1])).sum()
}

/// Convert a distance in meters to degrees of latitude.
pub fn meters_to_degrees(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_M).to_degrees()
}
