//! # Navigation Status
//!
//! Follows a route waypoint by waypoint. Every position fix produces a
//! [`NavigationStatus`] snapshot: distance and bearing to the active
//! waypoint, turn relative to the current heading, cross-track error on the
//! current leg, time en route and velocity made good.
//!
//! The active-waypoint cursor only moves forward on its own (arrival within
//! the waypoint's proximity radius); [`NavigationEngine::advance_waypoint`]
//! and [`NavigationEngine::retreat_waypoint`] move it explicitly.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result};
use crate::geo_utils::{bearing, cross_track_deviation, distance, turn};
use crate::{Coordinate, Route, Waypoint};

/// A live position fix from the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct PositionFix {
    pub coord: Coordinate,
    /// Ground speed in m/s
    pub speed: Option<f64>,
    /// Course over ground in degrees
    pub course: Option<f64>,
    /// Unix milliseconds
    pub time: i64,
}

impl PositionFix {
    pub fn new(latitude: f64, longitude: f64, time: i64) -> Self {
        Self {
            coord: Coordinate::new(latitude, longitude),
            speed: None,
            course: None,
            time,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_course(mut self, course: f64) -> Self {
        self.course = Some(course);
        self
    }

    /// Speed usable as a divisor.
    fn moving_speed(&self) -> Option<f64> {
        self.speed.filter(|s| s.is_finite() && *s > 0.0)
    }
}

/// Snapshot of the navigation state after a fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct NavigationStatus {
    pub route_name: String,
    pub waypoint_index: u32,
    pub waypoint_name: String,
    /// Meters to the active waypoint
    pub distance: f64,
    /// Degrees true from the position to the active waypoint
    pub bearing: f64,
    /// Heading change needed to face the waypoint, degrees in (-180, 180];
    /// positive is right
    pub turn: f64,
    /// Cross-track error on the leg into the active waypoint; positive is
    /// right of course. `None` on the first waypoint or when the position
    /// is not abeam the leg.
    pub xtk: Option<f64>,
    /// Seconds to the active waypoint at the current speed
    pub ete: Option<f64>,
    /// Seconds to the end of the route at the current speed
    pub route_ete: Option<f64>,
    /// Speed component towards the waypoint, m/s
    pub vmg: Option<f64>,
    /// Meters to the end of the route along the remaining legs
    pub distance_remaining: f64,
    pub complete: bool,
}

/// Active-route follower.
#[derive(Debug, Clone)]
pub struct NavigationEngine {
    route: Route,
    active: usize,
    complete: bool,
    /// Bearing to the active waypoint at the previous fix
    last_bearing: Option<f64>,
    status: Option<NavigationStatus>,
}

impl NavigationEngine {
    /// Start following a route from its first waypoint.
    pub fn new(route: Route) -> Result<Self> {
        route
            .waypoints
            .first()
            .ok_or_insufficient_points(&route.name, 0, 1)?;
        info!(
            "[Navigation] Following '{}' ({} waypoints, {:.0} m)",
            route.name,
            route.waypoints.len(),
            route.distance()
        );
        Ok(Self {
            route,
            active: 0,
            complete: false,
            last_bearing: None,
            status: None,
        })
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_waypoint(&self) -> &Waypoint {
        &self.route.waypoints[self.active]
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Status computed for the most recent fix.
    pub fn status(&self) -> Option<&NavigationStatus> {
        self.status.as_ref()
    }

    pub fn has_next(&self) -> bool {
        self.active + 1 < self.route.waypoints.len()
    }

    pub fn has_prev(&self) -> bool {
        self.active > 0
    }

    /// Make the next waypoint active. `false` on the last waypoint.
    pub fn advance_waypoint(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.active += 1;
        self.last_bearing = None;
        debug!("[Navigation] Active waypoint {}", self.active);
        true
    }

    /// Make the previous waypoint active, resuming a completed route.
    /// `false` on the first waypoint.
    pub fn retreat_waypoint(&mut self) -> bool {
        if !self.has_prev() {
            return false;
        }
        self.active -= 1;
        self.complete = false;
        self.last_bearing = None;
        debug!("[Navigation] Active waypoint {}", self.active);
        true
    }

    /// Recompute the status for a new position fix.
    ///
    /// Arriving within the active waypoint's proximity radius advances the
    /// cursor, or completes the route on the last waypoint.
    pub fn update(&mut self, fix: &PositionFix) -> NavigationStatus {
        let position = fix.coord.clamp();

        if !self.complete {
            let wpt = self.active_waypoint();
            if distance(&position, &wpt.coord) < wpt.proximity {
                if self.has_next() {
                    info!("[Navigation] Arrived at '{}'", wpt.name);
                    self.advance_waypoint();
                } else {
                    info!("[Navigation] Route '{}' complete", self.route.name);
                    self.complete = true;
                }
            }
        }

        let wpt = self.active_waypoint();
        let dist = distance(&position, &wpt.coord);
        let brg = bearing(&position, &wpt.coord);

        let heading = fix
            .course
            .filter(|c| c.is_finite())
            .or(self.last_bearing);
        let turn_angle = heading.map(|h| turn(h, brg)).unwrap_or(0.0);

        let xtk = if self.active > 0 {
            let leg_start = &self.route.waypoints[self.active - 1].coord;
            let course = bearing(leg_start, &wpt.coord);
            cross_track_deviation(dist, course, brg)
        } else {
            None
        };

        let remaining = dist
            + (self.active + 1..self.route.waypoints.len())
                .map(|i| self.route.leg_length(i))
                .sum::<f64>();

        let speed = fix.moving_speed();
        let status = NavigationStatus {
            route_name: self.route.name.clone(),
            waypoint_index: self.active as u32,
            waypoint_name: wpt.name.clone(),
            distance: dist,
            bearing: brg,
            turn: turn_angle,
            xtk,
            ete: speed.map(|s| dist / s),
            route_ete: speed.map(|s| remaining / s),
            vmg: speed.map(|s| s * turn_angle.to_radians().cos()),
            distance_remaining: remaining,
            complete: self.complete,
        };

        self.last_bearing = Some(brg);
        self.status = Some(status.clone());
        status
    }
}
