//! Peak elimination.
//!
//! Starts from the two track endpoints and repeatedly splits every leg at
//! its extreme left and right cross-track outliers until all track points
//! between the leg's anchors lie within tolerance of it.

use log::{debug, warn};

use super::{check_input, route_name, WAYPOINT_PREFIX};
use crate::error::Result;
use crate::geo_utils::{bearing, cross_track_deviation, distance};
use crate::{NavConfig, Route, Track, Waypoint};

/// Extreme deviations found between two anchors.
#[derive(Debug, Default, Clone, Copy)]
struct LegPeaks {
    /// Most negative (left) deviation and its track index
    min: f64,
    min_index: usize,
    /// Most positive (right) deviation and its track index
    max: f64,
    max_index: usize,
}

/// Simplify by recursive peak elimination.
///
/// Fails like [`super::simplify_track`] on short tracks or bad settings.
pub fn simplify_peaks(track: &Track, sensitivity: f64, config: &NavConfig) -> Result<Route> {
    check_input(track, sensitivity, config)?;

    let points = &track.points;
    let tolerance = config.tolerance(sensitivity);
    let ceiling = config.max_route_vectors as usize;
    let last = points.len() - 1;

    let mut route = Route::new(route_name(track));
    // Track index each waypoint was taken from; parallel to route.waypoints
    let mut anchors: Vec<usize> = Vec::new();

    route.add_waypoint(Waypoint::new(WAYPOINT_PREFIX, points[0].coord, 0.0));
    anchors.push(0);
    route.add_waypoint(Waypoint::new(WAYPOINT_PREFIX, points[last].coord, 0.0));
    anchors.push(last);

    // Number of legs currently in the route
    let mut vectors = 1usize;
    let mut passes = 0usize;
    let mut changed = true;

    while changed {
        changed = false;
        passes += 1;

        // Walk legs back to front so insertions never shift unvisited legs
        for i in (1..=vectors).rev() {
            if route.waypoints[i].silent {
                continue;
            }

            let peaks = find_peaks(track, &route, &anchors, i);

            if peaks.min >= -tolerance && peaks.max <= tolerance {
                route.waypoints[i].silent = true;
                continue;
            }

            let min_qualifies = peaks.min < -tolerance;
            if min_qualifies {
                let tp = &points[peaks.min_index];
                route.insert_waypoint(i, Waypoint::new(WAYPOINT_PREFIX, tp.coord, 0.0));
                anchors.insert(i, peaks.min_index);
                vectors += 1;
                changed = true;
            }
            if peaks.max > tolerance {
                let tp = &points[peaks.max_index];
                // Right peak follows the left one only if it comes later on the track
                let at = if min_qualifies && peaks.min_index < peaks.max_index {
                    i + 1
                } else {
                    i
                };
                route.insert_waypoint(at, Waypoint::new(WAYPOINT_PREFIX, tp.coord, 0.0));
                anchors.insert(at, peaks.max_index);
                vectors += 1;
                changed = true;
            }
        }

        if vectors > ceiling {
            warn!(
                "[Simplify] '{}' hit the {} vector ceiling after {} passes",
                track.name, ceiling, passes
            );
            break;
        }
    }

    debug!(
        "[Simplify] peak elimination converged in {} passes with {} legs",
        passes, vectors
    );

    for (n, wpt) in route.waypoints.iter_mut().enumerate() {
        wpt.name = format!("{}{}", WAYPOINT_PREFIX, n);
        wpt.proximity = config.proximity_m;
        wpt.silent = false;
    }
    route.visible = true;
    Ok(route)
}

/// Scan the track points between the anchors of leg `i` (ending at waypoint
/// `i`) for the extreme deviations from the leg's course.
fn find_peaks(track: &Track, route: &Route, anchors: &[usize], i: usize) -> LegPeaks {
    let start = &route.waypoints[i - 1].coord;
    let finish = &route.waypoints[i].coord;
    let course = bearing(start, finish);

    let mut peaks = LegPeaks::default();
    for j in anchors[i - 1]..anchors[i] {
        let tp = &track.points[j].coord;
        let to_finish = bearing(tp, finish);
        let remaining = distance(tp, finish);
        let Some(xtk) = cross_track_deviation(remaining, course, to_finish) else {
            continue;
        };
        if xtk < peaks.min {
            peaks.min = xtk;
            peaks.min_index = j;
        }
        if xtk > peaks.max {
            peaks.max = xtk;
            peaks.max_index = j;
        }
    }
    peaks
}
