//! # Track Simplification
//!
//! Converts a dense recorded track into a sparse navigable route.
//!
//! Two strategies are available:
//! - **Peak elimination** (`peaks`): recursive refinement that inserts a
//!   waypoint at the worst cross-track outlier of every leg until each leg
//!   holds its track points within tolerance. Thorough, worst case O(n²)
//!   bounded by the route-vector ceiling.
//! - **Turn detection** (`turns`): a single forward pass that commits a
//!   waypoint whenever the track turns away from the current course by more
//!   than a multiple of the tolerance. O(n), suited to very long tracks.
//!
//! Both are deterministic for a given track, sensitivity and config.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::{NavConfig, Route, Track};

mod peaks;
mod turns;

pub use peaks::simplify_peaks;
pub use turns::simplify_turns;

/// Minimum number of track points required to derive a route.
pub const MIN_TRACK_POINTS: usize = 2;

/// Prefix of generated waypoint names.
pub(crate) const WAYPOINT_PREFIX: &str = "RWPT";

/// Which simplification algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum SimplificationStrategy {
    /// Recursive extreme-deviation refinement
    #[default]
    PeakElimination,
    /// Single-pass forward turn detection
    TurnDetection,
}

/// Simplify a track into a route.
///
/// `sensitivity` scales `config.proximity_m` into the deviation tolerance.
/// Fails with [`NavError::InsufficientPoints`] for tracks shorter than two
/// points; no partial route is returned.
pub fn simplify_track(
    track: &Track,
    strategy: SimplificationStrategy,
    sensitivity: f64,
    config: &NavConfig,
) -> Result<Route> {
    check_input(track, sensitivity, config)?;

    debug!(
        "[Simplify] {:?} on '{}' ({} points, tolerance {:.1} m)",
        strategy,
        track.name,
        track.points.len(),
        config.tolerance(sensitivity)
    );

    let start = std::time::Instant::now();
    let route = match strategy {
        SimplificationStrategy::PeakElimination => simplify_peaks(track, sensitivity, config)?,
        SimplificationStrategy::TurnDetection => simplify_turns(track, sensitivity, config)?,
    };

    info!(
        "[Simplify] '{}': {} points -> {} waypoints in {:?}",
        track.name,
        track.points.len(),
        route.waypoints.len(),
        start.elapsed()
    );

    Ok(route)
}

/// Reject tracks too short to simplify and settings no strategy can run with.
pub(crate) fn check_input(track: &Track, sensitivity: f64, config: &NavConfig) -> Result<()> {
    if track.points.len() < MIN_TRACK_POINTS {
        return Err(NavError::InsufficientPoints {
            track: track.name.clone(),
            point_count: track.points.len(),
            minimum_required: MIN_TRACK_POINTS,
        });
    }
    if !(sensitivity.is_finite() && sensitivity > 0.0) {
        return Err(NavError::ConfigError {
            message: format!("sensitivity must be a positive number, got {}", sensitivity),
        });
    }
    config.validate()
}

/// Simplify several tracks sequentially.
///
/// Each entry carries its own result; one short track does not fail the batch.
pub fn simplify_tracks(
    tracks: &[Track],
    strategy: SimplificationStrategy,
    sensitivity: f64,
    config: &NavConfig,
) -> Vec<Result<Route>> {
    tracks
        .iter()
        .map(|t| simplify_track(t, strategy, sensitivity, config))
        .collect()
}

/// Parallel version of [`simplify_tracks`].
///
/// Uses Rayon; output order matches input order.
#[cfg(feature = "parallel")]
pub fn simplify_tracks_parallel(
    tracks: &[Track],
    strategy: SimplificationStrategy,
    sensitivity: f64,
    config: &NavConfig,
) -> Vec<Result<Route>> {
    use rayon::prelude::*;

    tracks
        .par_iter()
        .map(|t| simplify_track(t, strategy, sensitivity, config))
        .collect()
}

/// Name of a route derived from a track.
pub(crate) fn route_name(track: &Track) -> String {
    format!("RT_{}", track.name)
}
