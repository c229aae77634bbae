//! # Raster Maps
//!
//! Map descriptors, the collaborator traits that acquire and draw map
//! resources, the spatially indexed [`MapCatalog`] and the
//! [`ViewportController`] state machine that keeps exactly one map active.
//!
//! Decoding and drawing of map images happen outside this crate: a host
//! supplies a [`MapLoader`] whose surfaces do the actual work.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Bounds, Coordinate};

pub mod catalog;
pub mod viewport;

pub use catalog::{IndexLoad, MapCatalog, MapIndexFile};
pub use viewport::{ViewportController, ViewportEvent, ViewportListener};

/// Identifier of a map in the catalog. Id 0 is the synthetic fallback map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapId(pub u32);

impl MapId {
    pub const FALLBACK: MapId = MapId(0);
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Zoom levels offered by the fallback map.
const FALLBACK_ZOOM_LEVELS: [f64; 5] = [0.25, 0.5, 1.0, 2.0, 4.0];

/// Static description of a raster map as produced by the map indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct MapDescriptor {
    pub id: MapId,
    pub title: String,
    /// Location of the map file, opaque to this crate
    pub path: String,
    /// Geographic coverage
    pub bounds: Bounds,
    /// Raster width in pixels at zoom 1
    pub width: u32,
    /// Raster height in pixels at zoom 1
    pub height: u32,
    /// Available zoom factors, ascending
    pub zoom_levels: Vec<f64>,
    /// Suitability rank; lower ranks are preferred when maps overlap
    pub rank: u32,
    /// Problem reported by the indexer; such maps are never offered
    #[serde(default)]
    pub load_error: Option<String>,
}

impl MapDescriptor {
    /// Synthetic world-covering map used when no real map covers a point.
    pub fn fallback() -> Self {
        Self {
            id: MapId::FALLBACK,
            title: "Blank".to_string(),
            path: String::new(),
            bounds: Bounds::world(),
            width: 360 * 256,
            height: 180 * 256,
            zoom_levels: FALLBACK_ZOOM_LEVELS.to_vec(),
            rank: u32::MAX,
            load_error: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.id == MapId::FALLBACK
    }

    /// Check whether this map covers a coordinate.
    pub fn covers(&self, coord: &Coordinate) -> bool {
        self.bounds.contains(coord)
    }

    /// Sort and deduplicate the zoom table, dropping non-positive entries.
    pub(crate) fn normalize_zoom_levels(&mut self) {
        self.zoom_levels.retain(|z| z.is_finite() && *z > 0.0);
        self.zoom_levels.sort_by(|a, b| a.total_cmp(b));
        self.zoom_levels.dedup();
        if self.zoom_levels.is_empty() {
            self.zoom_levels.push(1.0);
        }
    }

    /// Zoom a map starts at when nothing was shown before: 1.0 if offered,
    /// else the offered level closest to it.
    pub fn initial_zoom(&self) -> f64 {
        self.nearest_zoom(1.0)
    }

    /// Offered zoom level closest to `zoom`.
    pub fn nearest_zoom(&self, zoom: f64) -> f64 {
        self.zoom_levels
            .iter()
            .copied()
            .min_by(|a, b| (a - zoom).abs().total_cmp(&(b - zoom).abs()))
            .unwrap_or(1.0)
    }

    pub fn min_zoom(&self) -> f64 {
        self.zoom_levels.first().copied().unwrap_or(1.0)
    }

    pub fn max_zoom(&self) -> f64 {
        self.zoom_levels.last().copied().unwrap_or(1.0)
    }

    /// Pixel position of a coordinate at the given zoom (linear projection
    /// over the map bounds, origin top-left).
    pub fn xy_by_lat_lon(&self, coord: &Coordinate, zoom: f64) -> (f64, f64) {
        let x = (coord.longitude - self.bounds.min_lng) / self.bounds.lng_span()
            * self.width as f64
            * zoom;
        let y = (self.bounds.max_lat - coord.latitude) / self.bounds.lat_span()
            * self.height as f64
            * zoom;
        (x, y)
    }

    /// Inverse of [`MapDescriptor::xy_by_lat_lon`].
    pub fn lat_lon_by_xy(&self, x: f64, y: f64, zoom: f64) -> Coordinate {
        let lng = self.bounds.min_lng + x / (self.width as f64 * zoom) * self.bounds.lng_span();
        let lat = self.bounds.max_lat - y / (self.height as f64 * zoom) * self.bounds.lat_span();
        Coordinate::new(lat, lng)
    }
}

/// What a draw call should cover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// Coordinate at the viewport center
    pub location: Coordinate,
    /// Pixel offset of the focus point from the center (look-ahead)
    pub look_ahead: (i32, i32),
    pub width: u32,
    pub height: u32,
}

/// Failure reported by a map surface while drawing.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Not enough memory to decode or draw the visible tiles
    OutOfMemory,
    /// Any other drawing failure
    Failed(String),
}

/// Activated resources of one map (decoder state, tile index, caches).
///
/// All calls are made while the viewport holds its map lock, so a surface
/// never sees `draw` and `deactivate` concurrently.
pub trait MapSurface: Send {
    /// Draw the visible part of the map at `zoom`.
    fn draw(&mut self, request: &RenderRequest, zoom: f64) -> std::result::Result<(), RenderError>;

    /// Release the resources acquired by activation.
    fn deactivate(&mut self);
}

/// Acquires map resources on behalf of the viewport.
pub trait MapLoader: Send + Sync {
    /// Activate a map. Errors leave the previously active map in place.
    fn activate(&self, map: &MapDescriptor) -> std::result::Result<Box<dyn MapSurface>, String>;
}

/// Surface of the fallback map; draws nothing.
#[derive(Debug, Default)]
pub(crate) struct BlankSurface;

impl MapSurface for BlankSurface {
    fn draw(&mut self, _request: &RenderRequest, _zoom: f64) -> std::result::Result<(), RenderError> {
        Ok(())
    }

    fn deactivate(&mut self) {}
}
