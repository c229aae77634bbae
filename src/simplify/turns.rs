//! Forward turn detection.
//!
//! Walks the track once. After a course is established, accumulated heading
//! change flags a candidate turn point; the turn is committed as a waypoint
//! once the track has moved far enough sideways from the candidate. Long
//! straight stretches are split at a fixed multiple of the tolerance.

use log::trace;

use super::{check_input, route_name, WAYPOINT_PREFIX};
use crate::error::Result;
use crate::geo_utils::{bearing, cross_track_deviation, distance, reverse_bearing, turn};
use crate::{Coordinate, NavConfig, Route, Track, Waypoint};

/// Current reference course and its reverse.
#[derive(Debug, Clone, Copy)]
struct Course {
    forward: f64,
    reverse: f64,
}

impl Course {
    fn between(from: &Coordinate, to: &Coordinate) -> Self {
        let forward = bearing(from, to);
        Self {
            forward,
            reverse: reverse_bearing(forward),
        }
    }
}

/// Simplify by single-pass turn detection.
///
/// Fails like [`super::simplify_track`] on short tracks or bad settings.
pub fn simplify_turns(track: &Track, sensitivity: f64, config: &NavConfig) -> Result<Route> {
    check_input(track, sensitivity, config)?;

    let points = &track.points;
    let tolerance = config.tolerance(sensitivity);
    let confirm = tolerance * config.turn_confirm_factor;
    let split = tolerance * config.straight_split_factor;

    let mut route = Route::new(route_name(track));
    let push = |route: &mut Route, coord: Coordinate| {
        let name = format!("{}{}", WAYPOINT_PREFIX, route.waypoints.len());
        route.add_waypoint(Waypoint::new(name, coord, config.proximity_m));
    };

    // Last committed route point
    let mut anchor = points[0].coord;
    push(&mut route, anchor);

    let mut previous = anchor;
    let mut candidate: Option<Coordinate> = None;
    let mut course: Option<Course> = None;
    // Displacement since the anchor, accumulated turn, previous segment bearing
    let mut travelled = 0.0f64;
    let mut turned = 0.0f64;
    let mut last_bearing = 0.0f64;
    let mut xtk = 0.0f64;

    for (i, tp) in points.iter().enumerate().skip(1) {
        let current = tp.coord;
        travelled += distance(&previous, &current);
        let b = bearing(&previous, &current);
        turned += turn(last_bearing, b);
        if turned.abs() >= 360.0 {
            turned -= 360.0 * turned.signum();
        }
        previous = current;
        last_bearing = b;

        let Some(active) = course else {
            if travelled > tolerance {
                let established = Course::between(&anchor, &current);
                last_bearing = established.forward;
                turned = 0.0;
                course = Some(established);
                trace!("[Simplify] course {:.1} at point {}", established.forward, i);
            }
            continue;
        };

        if turned.abs() > config.turn_threshold_deg {
            if candidate.is_none() {
                candidate = Some(current);
                trace!("[Simplify] candidate turn at point {}", i);
                continue;
            }
        } else if candidate.is_some() && xtk < tolerance / 10.0 {
            candidate = None;
            xtk = 0.0;
        }

        if let Some(turn_point) = candidate {
            let back = distance(&current, &turn_point);
            let back_bearing = bearing(&current, &turn_point);
            // Sharp turns put the candidate behind the reversed course
            let deviation = cross_track_deviation(back, active.reverse, back_bearing)
                .or_else(|| cross_track_deviation(back, active.forward, back_bearing));
            xtk = deviation.unwrap_or(f64::INFINITY);

            if xtk.abs() > confirm {
                anchor = turn_point;
                push(&mut route, anchor);
                let established = Course::between(&anchor, &current);
                last_bearing = established.forward;
                course = Some(established);
                turned = 0.0;
                candidate = None;
                travelled = 0.0;
                xtk = 0.0;
                trace!("[Simplify] turn committed at point {}", i);
            }
            continue;
        }

        if travelled > split {
            anchor = current;
            push(&mut route, anchor);
            travelled = 0.0;
        }
    }

    push(&mut route, points[points.len() - 1].coord);
    route.visible = true;
    Ok(route)
}
