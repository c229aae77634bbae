//! # Algorithm Toolbox
//!
//! Direct access to the pure algorithms of the navigation core, for
//! integrating them into other systems without the [`crate::NavEngine`]
//! context.
//!
//! ## Core Algorithms
//!
//! - **Track Simplification**: peak elimination and turn detection
//! - **Route Deviation**: how far a track strays from a route
//!
//! ## Geographic Utilities
//!
//! - **Distance / Bearing**: great-circle metrics between coordinates
//! - **Turn**: signed heading change
//! - **Cross-Track Deviation**: signed lateral offset from a course line
//!
//! # Example
//!
//! ```rust
//! use trailnav::algorithms::{bearing, distance, Coordinate};
//!
//! let bern = Coordinate::new(46.9480, 7.4474);
//! let thun = Coordinate::new(46.7580, 7.6280);
//! println!("{:.0} m at {:.0} degrees", distance(&bern, &thun), bearing(&bern, &thun));
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{Coordinate, NavConfig, Route, Track, TrackPoint, Waypoint};

// =============================================================================
// Geographic Utilities
// =============================================================================

pub use crate::geo_utils::{
    bearing, clamp_coordinate, cross_track_deviation, distance, leg_lengths, meters_to_degrees,
    normalize_bearing, polyline_length, reverse_bearing, turn, EARTH_RADIUS_M,
};

// =============================================================================
// Track Simplification
// =============================================================================

/// Simplify a track with the chosen strategy.
///
/// Fails for tracks with fewer than two points.
pub use crate::simplify::simplify_track;

/// Peak elimination: repeatedly split every leg at its extreme cross-track
/// outliers until all track points are within tolerance.
pub use crate::simplify::simplify_peaks;

/// Turn detection: one forward pass committing a waypoint at every turn
/// that moves the track sideways by a multiple of the tolerance.
pub use crate::simplify::simplify_turns;

/// Strategy selector
pub use crate::simplify::SimplificationStrategy;

// =============================================================================
// Route Deviation
// =============================================================================

/// Lateral distance in meters from a point to the closest leg of a route.
///
/// Only legs the point is abeam of are considered; the waypoints themselves
/// also count, so a point near a corner measures its distance to the corner.
/// `None` for an empty route.
///
/// # Example
/// ```rust
/// use trailnav::algorithms::{deviation_from_route, Coordinate, Route, Waypoint};
///
/// let mut route = Route::new("east");
/// route.add_waypoint(Waypoint::new("A", Coordinate::new(0.0, 0.0), 50.0));
/// route.add_waypoint(Waypoint::new("B", Coordinate::new(0.0, 0.01), 50.0));
///
/// let off = deviation_from_route(&Coordinate::new(0.001, 0.005), &route).unwrap();
/// assert!((off - 111.2).abs() < 1.0);
/// ```
pub fn deviation_from_route(point: &Coordinate, route: &Route) -> Option<f64> {
    let nearest_waypoint = route
        .waypoints
        .iter()
        .map(|w| distance(point, &w.coord))
        .min_by(|a, b| a.total_cmp(b))?;

    let nearest_leg = route
        .waypoints
        .windows(2)
        .filter_map(|leg| {
            let (start, finish) = (&leg[0].coord, &leg[1].coord);
            // Abeam only if the point projects between the leg's ends
            cross_track_deviation(
                distance(point, start),
                bearing(finish, start),
                bearing(point, start),
            )?;
            cross_track_deviation(
                distance(point, finish),
                bearing(start, finish),
                bearing(point, finish),
            )
        })
        .map(f64::abs)
        .min_by(|a, b| a.total_cmp(b));

    Some(nearest_leg.map_or(nearest_waypoint, |leg| leg.min(nearest_waypoint)))
}

/// Largest [`deviation_from_route`] over all points of a track.
///
/// `None` when the track or the route is empty.
pub fn max_deviation(track: &Track, route: &Route) -> Option<f64> {
    track
        .points
        .iter()
        .filter_map(|tp| deviation_from_route(&tp.coord, route))
        .max_by(|a, b| a.total_cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(coords: &[(f64, f64)]) -> Route {
        let mut route = Route::new("r");
        for (i, &(lat, lon)) in coords.iter().enumerate() {
            route.add_waypoint(Waypoint::new(format!("W{i}"), Coordinate::new(lat, lon), 50.0));
        }
        route
    }

    #[test]
    fn test_deviation_on_leg_is_zero() {
        let r = route(&[(0.0, 0.0), (0.0, 0.01)]);
        let d = deviation_from_route(&Coordinate::new(0.0, 0.004), &r).unwrap();
        assert!(d < 1e-6, "{d}");
    }

    #[test]
    fn test_deviation_beyond_leg_uses_waypoint() {
        let r = route(&[(0.0, 0.0), (0.0, 0.01)]);
        // 0.001 degrees past B, on the extension of the leg
        let d = deviation_from_route(&Coordinate::new(0.0, 0.011), &r).unwrap();
        assert!((d - 111.2).abs() < 1.0, "{d}");
    }

    #[test]
    fn test_deviation_picks_closest_leg() {
        let r = route(&[(0.0, 0.0), (0.0, 0.01), (0.01, 0.01)]);
        // 0.0005 degrees west of the northbound leg
        let d = deviation_from_route(&Coordinate::new(0.005, 0.0095), &r).unwrap();
        assert!((d - 55.6).abs() < 1.0, "{d}");
    }

    #[test]
    fn test_deviation_empty_route() {
        assert!(deviation_from_route(&Coordinate::new(0.0, 0.0), &Route::new("e")).is_none());
        assert!(max_deviation(&Track::new("t"), &route(&[(0.0, 0.0)])).is_none());
    }

    #[test]
    fn test_max_deviation_of_simplified_track() {
        let mut track = Track::new("t");
        for i in 0..=20 {
            let lat = if i == 10 { 0.0002 } else { 0.0 };
            track.push(TrackPoint::new(lat, i as f64 * 0.001, i * 1000));
        }
        let config = NavConfig::default();
        let simplified =
            simplify_track(&track, SimplificationStrategy::PeakElimination, 1.0, &config).unwrap();
        // The 22 m bump stays under the 50 m tolerance
        assert_eq!(simplified.waypoints.len(), 2);
        let worst = max_deviation(&track, &simplified).unwrap();
        assert!(worst <= config.tolerance(1.0), "{worst}");
        assert!(worst > 20.0);
    }
}
