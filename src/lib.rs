//! # Trailnav
//!
//! Navigation core for a field-navigation client that follows a moving
//! position on raster maps and guides along routes derived from recorded
//! tracks.
//!
//! This library provides:
//! - Great-circle geometry primitives (bearing, distance, turn, cross-track)
//! - Track-to-route simplification (peak elimination and turn detection)
//! - Raster map catalog with a lock-guarded viewport controller
//! - Live navigation status along an active route
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel batch simplification with rayon
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trailnav::{simplify_track, NavConfig, SimplificationStrategy, Track, TrackPoint};
//!
//! let mut track = Track::new("walk");
//! for i in 0..20 {
//!     track.push(TrackPoint::new(0.0, i as f64 * 0.001, i * 1000));
//! }
//!
//! let route = simplify_track(
//!     &track,
//!     SimplificationStrategy::PeakElimination,
//!     1.0,
//!     &NavConfig::default(),
//! )
//! .unwrap();
//! assert_eq!(route.waypoints.len(), 2);
//! assert_eq!(route.name, "RT_walk");
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{NavError, OptionExt, Result};

// Tunables for simplification and navigation
pub mod config;
pub use config::{AngleType, NavConfig};

// Geographic primitives (bearing, distance, turn, cross-track)
pub mod geo_utils;

// Algorithm toolbox - standalone access to the pure algorithms
pub mod algorithms;

// Track-to-route simplification
pub mod simplify;
#[cfg(feature = "parallel")]
pub use simplify::simplify_tracks_parallel;
pub use simplify::{simplify_track, simplify_tracks, SimplificationStrategy};

// Map catalog and viewport state machine
pub mod map;
pub use map::{
    IndexLoad, MapCatalog, MapDescriptor, MapId, MapLoader, MapSurface, RenderError,
    RenderRequest, ViewportController, ViewportEvent, ViewportListener,
};

// Live navigation along a route
pub mod navigation;
pub use navigation::{NavigationEngine, NavigationStatus, PositionFix};

// Application context (tracks, routes, waypoints, viewport, navigation)
pub mod engine;
pub use engine::{DeclinationModel, EngineStats, FixOutcome, NavEngine};

// Background execution with completion handles
pub mod worker;
pub use worker::WorkerHandle;

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TrailnavRust"),
    );
}

/// Initialize logging for Android. No-op elsewhere; hosts install their own logger.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {}

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use trailnav::Coordinate;
/// let summit = Coordinate::new(46.5580, 7.8350);
/// assert!(summit.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Create a coordinate clamped into the valid WGS84 range.
    pub fn clamped(latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude).clamp()
    }

    /// Clamp latitude to [-90, 90] and longitude to [-180, 180].
    ///
    /// Non-finite components collapse to zero.
    pub fn clamp(self) -> Self {
        let fix = |v: f64, limit: f64| if v.is_finite() { v.clamp(-limit, limit) } else { 0.0 };
        Self {
            latitude: fix(self.latitude, 90.0),
            longitude: fix(self.longitude, 180.0),
        }
    }

    /// Check if the coordinate is finite and inside the WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A recorded track point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackPoint {
    pub coord: Coordinate,
    /// Unix timestamp in milliseconds
    pub time: i64,
    /// Elevation in meters
    pub elevation: Option<f64>,
    /// Ground speed in m/s
    pub speed: Option<f64>,
}

impl TrackPoint {
    /// Create a track point without elevation or speed.
    pub fn new(latitude: f64, longitude: f64, time: i64) -> Self {
        Self {
            coord: Coordinate::new(latitude, longitude),
            time,
            elevation: None,
            speed: None,
        }
    }
}

/// A named recorded track.
///
/// Points are only ever appended while recording; removal of the whole track
/// goes through [`NavEngine::remove_track`], which flips `removed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Track {
    pub name: String,
    pub points: Vec<TrackPoint>,
    #[serde(skip)]
    pub removed: bool,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: Vec::new(),
            removed: false,
        }
    }

    pub fn with_points(name: impl Into<String>, points: Vec<TrackPoint>) -> Self {
        Self {
            name: name.into(),
            points,
            removed: false,
        }
    }

    /// Append a freshly recorded point.
    pub fn push(&mut self, point: TrackPoint) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Identifier of a waypoint set. Set 0 is the default set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WaypointSetId(pub u32);

impl WaypointSetId {
    pub const DEFAULT: WaypointSetId = WaypointSetId(0);
}

/// A named group of waypoints, usually backed by one waypoint file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct WaypointSet {
    pub id: WaypointSetId,
    pub name: String,
}

/// A named point with an arrival radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Waypoint {
    pub name: String,
    pub coord: Coordinate,
    /// Arrival radius in meters
    pub proximity: f64,
    /// Simplification bookkeeping: the leg ending here has converged
    #[serde(skip)]
    pub silent: bool,
    /// Owning waypoint set (lookup only)
    pub set: Option<WaypointSetId>,
}

impl Waypoint {
    pub fn new(name: impl Into<String>, coord: Coordinate, proximity: f64) -> Self {
        Self {
            name: name.into(),
            coord,
            proximity,
            silent: false,
            set: None,
        }
    }
}

/// An ordered list of waypoints in travel direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Route {
    pub name: String,
    pub waypoints: Vec<Waypoint>,
    pub visible: bool,
    #[serde(skip)]
    pub removed: bool,
}

impl Route {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            waypoints: Vec::new(),
            visible: false,
            removed: false,
        }
    }

    /// Append a waypoint at the end of the route.
    pub fn add_waypoint(&mut self, waypoint: Waypoint) {
        self.waypoints.push(waypoint);
    }

    /// Insert a waypoint so that it ends up at `index`.
    ///
    /// Indices past the end append.
    pub fn insert_waypoint(&mut self, index: usize, waypoint: Waypoint) {
        let index = index.min(self.waypoints.len());
        self.waypoints.insert(index, waypoint);
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Length in meters of the leg ending at waypoint `index`.
    ///
    /// The first waypoint has no incoming leg and reports 0.
    pub fn leg_length(&self, index: usize) -> f64 {
        if index == 0 || index >= self.waypoints.len() {
            return 0.0;
        }
        geo_utils::distance(&self.waypoints[index - 1].coord, &self.waypoints[index].coord)
    }

    /// Total route length in meters.
    pub fn distance(&self) -> f64 {
        (1..self.waypoints.len()).map(|i| self.leg_length(i)).sum()
    }

    /// Route coordinates as a plain polyline.
    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.waypoints.iter().map(|w| w.coord).collect()
    }
}

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Bounds covering the whole globe.
    pub fn world() -> Self {
        Self {
            min_lat: -90.0,
            max_lat: 90.0,
            min_lng: -180.0,
            max_lng: 180.0,
        }
    }

    /// Create bounds from coordinates.
    pub fn from_points(points: &[Coordinate]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Check whether a coordinate lies inside (edges inclusive).
    pub fn contains(&self, coord: &Coordinate) -> bool {
        coord.latitude >= self.min_lat
            && coord.latitude <= self.max_lat
            && coord.longitude >= self.min_lng
            && coord.longitude <= self.max_lng
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }
}

// ============================================================================
// Tests
// ============================================================================
