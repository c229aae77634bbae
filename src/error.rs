//! Unified error handling for the navigation core.
//!
//! Geometry that cannot be projected is not an error here: cross-track
//! deviation returns `None` for that case. This type covers the failures
//! that abort a call (short tracks, map activation, index parsing).

use std::fmt;

use crate::map::MapId;

/// Unified error type for navigation core operations.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum NavError {
    /// Track has too few points to derive a route from
    InsufficientPoints {
        track: String,
        point_count: usize,
        minimum_required: usize,
    },
    /// Coordinate outside the WGS84 range or not finite
    InvalidCoordinates { message: String },
    /// Map resources could not be acquired; the previous map stays active
    MapActivationFailed { map_id: MapId, message: String },
    /// Map is not among the maps covering the current location
    MapNotAvailable { map_id: MapId },
    /// Drawing failed for a reason other than memory exhaustion
    RenderFailed { message: String },
    /// Persisted map index could not be parsed or written
    IndexFormat { message: String },
    /// Configuration error
    ConfigError { message: String },
    /// Navigation command issued without an active route
    NoActiveRoute,
    /// Background worker exited without delivering a result
    WorkerDisconnected { task: String },
}

impl fmt::Display for NavError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavError::InsufficientPoints {
                track,
                point_count,
                minimum_required,
            } => {
                write!(
                    f,
                    "Track '{}' has {} points, minimum {} required",
                    track, point_count, minimum_required
                )
            }
            NavError::InvalidCoordinates { message } => {
                write!(f, "Invalid coordinates: {}", message)
            }
            NavError::MapActivationFailed { map_id, message } => {
                write!(f, "Map {} failed to activate: {}", map_id, message)
            }
            NavError::MapNotAvailable { map_id } => {
                write!(f, "Map {} does not cover the current location", map_id)
            }
            NavError::RenderFailed { message } => {
                write!(f, "Render failed: {}", message)
            }
            NavError::IndexFormat { message } => {
                write!(f, "Map index error: {}", message)
            }
            NavError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            NavError::NoActiveRoute => write!(f, "No route is being navigated"),
            NavError::WorkerDisconnected { task } => {
                write!(f, "Worker for '{}' exited without a result", task)
            }
        }
    }
}

impl std::error::Error for NavError {}

impl From<serde_json::Error> for NavError {
    fn from(err: serde_json::Error) -> Self {
        NavError::IndexFormat {
            message: err.to_string(),
        }
    }
}

/// Result type alias for navigation core operations.
pub type Result<T> = std::result::Result<T, NavError>;

/// Extension trait for converting Option to NavError.
pub trait OptionExt<T> {
    /// Convert Option to Result with insufficient points error.
    fn ok_or_insufficient_points(self, track: &str, point_count: usize, minimum: usize)
        -> Result<T>;

    /// Convert Option to Result with map-not-available error.
    fn ok_or_map_not_available(self, map_id: MapId) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient_points(
        self,
        track: &str,
        point_count: usize,
        minimum: usize,
    ) -> Result<T> {
        self.ok_or_else(|| NavError::InsufficientPoints {
            track: track.to_string(),
            point_count,
            minimum_required: minimum,
        })
    }

    fn ok_or_map_not_available(self, map_id: MapId) -> Result<T> {
        self.ok_or(NavError::MapNotAvailable { map_id })
    }
}
