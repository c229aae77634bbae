//! FFI bindings for mobile platforms (iOS/Android).
//!
//! This module provides the UniFFI bindings that expose the navigation core
//! to Kotlin and Swift. Map images are decoded and drawn by the host: it
//! implements [`MapRenderer`], which is adapted here into the crate's
//! [`MapLoader`]/[`MapSurface`] pair. A [`NavSession`] object is the
//! explicit application context handed to the host.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};

use crate::engine::{EngineStats, NavEngine};
use crate::error::NavError;
use crate::map::{
    IndexLoad, MapCatalog, MapDescriptor, MapId, MapLoader, MapSurface, RenderError,
    RenderRequest, ViewportController, ViewportEvent, ViewportListener,
};
use crate::navigation::{NavigationStatus, PositionFix};
use crate::simplify::SimplificationStrategy;
use crate::{geo_utils, init_logging, Coordinate, NavConfig, Route, Track, WaypointSetId};

uniffi::custom_newtype!(MapId, u32);
uniffi::custom_newtype!(WaypointSetId, u32);

// ============================================================================
// Callback Interfaces (implemented in Kotlin/Swift)
// ============================================================================

/// Outcome of a host draw call.
#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum DrawOutcome {
    Drawn,
    OutOfMemory,
    Failed { message: String },
}

/// Host-side map decoder and renderer.
#[uniffi::export(callback_interface)]
pub trait MapRenderer: Send + Sync {
    /// Acquire resources for a map. Return an error message on failure.
    fn activate(&self, map: MapDescriptor) -> Option<String>;

    /// Draw the visible part of an active map.
    #[allow(clippy::too_many_arguments)]
    fn draw(
        &self,
        map_id: MapId,
        latitude: f64,
        longitude: f64,
        look_ahead_x: i32,
        look_ahead_y: i32,
        width: u32,
        height: u32,
        zoom: f64,
    ) -> DrawOutcome;

    /// Release the resources of a map.
    fn deactivate(&self, map_id: MapId);
}

/// Receives viewport notifications.
#[uniffi::export(callback_interface)]
pub trait ViewportCallback: Send + Sync {
    fn on_viewport_event(&self, event: ViewportEvent);
}

struct RendererLoader {
    renderer: Arc<dyn MapRenderer>,
}

impl MapLoader for RendererLoader {
    fn activate(&self, map: &MapDescriptor) -> Result<Box<dyn MapSurface>, String> {
        match self.renderer.activate(map.clone()) {
            Some(message) => Err(message),
            None => Ok(Box::new(RendererSurface {
                map_id: map.id,
                renderer: Arc::clone(&self.renderer),
            })),
        }
    }
}

struct RendererSurface {
    map_id: MapId,
    renderer: Arc<dyn MapRenderer>,
}

impl MapSurface for RendererSurface {
    fn draw(&mut self, request: &RenderRequest, zoom: f64) -> Result<(), RenderError> {
        match self.renderer.draw(
            self.map_id,
            request.location.latitude,
            request.location.longitude,
            request.look_ahead.0,
            request.look_ahead.1,
            request.width,
            request.height,
            zoom,
        ) {
            DrawOutcome::Drawn => Ok(()),
            DrawOutcome::OutOfMemory => Err(RenderError::OutOfMemory),
            DrawOutcome::Failed { message } => Err(RenderError::Failed(message)),
        }
    }

    fn deactivate(&mut self) {
        self.renderer.deactivate(self.map_id);
    }
}

struct CallbackListener(Box<dyn ViewportCallback>);

impl ViewportListener for CallbackListener {
    fn on_viewport_event(&self, event: &ViewportEvent) {
        self.0.on_viewport_event(event.clone());
    }
}

// ============================================================================
// Session Object
// ============================================================================

/// Navigation context owned by the host.
#[derive(uniffi::Object)]
pub struct NavSession {
    engine: Mutex<NavEngine>,
    /// Kept outside the engine lock so render threads never wait on it
    viewport: Arc<ViewportController>,
}

impl NavSession {
    /// Engine guard. Never hold it across a viewport call: viewport
    /// callbacks may come back into the session.
    fn engine(&self) -> MutexGuard<'_, NavEngine> {
        self.engine.lock().unwrap_or_else(|poisoned| {
            warn!("[NavEngine] Session lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[uniffi::export]
impl NavSession {
    /// Create a session over indexer output.
    #[uniffi::constructor]
    pub fn new(
        config: NavConfig,
        maps: Vec<MapDescriptor>,
        catalog_hash: u64,
        renderer: Box<dyn MapRenderer>,
    ) -> Result<Arc<Self>, NavError> {
        init_logging();
        config.validate()?;
        let loader = Arc::new(RendererLoader {
            renderer: Arc::from(renderer),
        });
        let engine = NavEngine::new(config, MapCatalog::new(maps, catalog_hash), loader);
        let viewport = engine.viewport();
        info!("[NavEngine] Session created");
        Ok(Arc::new(Self {
            engine: Mutex::new(engine),
            viewport,
        }))
    }

    pub fn add_viewport_callback(&self, callback: Box<dyn ViewportCallback>) {
        self.viewport.add_listener(Arc::new(CallbackListener(callback)));
    }

    /// Install a rebuilt map catalog.
    pub fn replace_maps(&self, maps: Vec<MapDescriptor>, catalog_hash: u64) -> Result<bool, NavError> {
        self.viewport
            .replace_catalog(MapCatalog::new(maps, catalog_hash))
    }

    pub fn simplify_track(
        &self,
        track: Track,
        strategy: Option<SimplificationStrategy>,
        sensitivity: f64,
    ) -> Result<Route, NavError> {
        self.engine().simplify_track(&track, strategy, sensitivity)
    }

    pub fn set_location(
        &self,
        latitude: f64,
        longitude: f64,
        find_best: bool,
        update_declination: bool,
    ) -> Result<bool, NavError> {
        let to = self
            .engine()
            .note_location(latitude, longitude, update_declination);
        self.viewport.set_location(to.latitude, to.longitude, find_best)
    }

    /// Show a coordinate and keep the map following the position.
    pub fn ensure_visible(&self, latitude: f64, longitude: f64) -> Result<bool, NavError> {
        let to = self.engine().note_location(latitude, longitude, true);
        let changed = self.viewport.set_location(to.latitude, to.longitude, false)?;
        self.engine().set_centered(true);
        Ok(changed)
    }

    pub fn scroll_map(&self, dx: f64, dy: f64) -> Result<bool, NavError> {
        self.viewport.scroll_map(dx, dy)
    }

    pub fn zoom_in(&self) -> bool {
        self.viewport.zoom_in()
    }

    pub fn zoom_out(&self) -> bool {
        self.viewport.zoom_out()
    }

    pub fn zoom_by(&self, factor: f64) -> bool {
        self.viewport.zoom_by(factor)
    }

    pub fn zoom(&self) -> Option<f64> {
        self.viewport.zoom()
    }

    pub fn select_map(&self, map_id: MapId) -> Result<bool, NavError> {
        self.viewport.select_map(map_id)
    }

    pub fn next_map(&self) -> Result<bool, NavError> {
        self.viewport.next_map()
    }

    pub fn prev_map(&self) -> Result<bool, NavError> {
        self.viewport.prev_map()
    }

    pub fn load_map(&self, map_id: MapId) -> Result<bool, NavError> {
        self.viewport.load_map(map_id)
    }

    pub fn current_map(&self) -> Option<MapDescriptor> {
        self.viewport.current_map()
    }

    pub fn suitable_maps(&self) -> Vec<MapDescriptor> {
        self.viewport.suitable_maps()
    }

    /// Draw the current map. `false` when nothing was drawn.
    pub fn render(
        &self,
        latitude: f64,
        longitude: f64,
        look_ahead_x: i32,
        look_ahead_y: i32,
        width: u32,
        height: u32,
    ) -> Result<bool, NavError> {
        self.viewport.render(&RenderRequest {
            location: Coordinate::new(latitude, longitude),
            look_ahead: (look_ahead_x, look_ahead_y),
            width,
            height,
        })
    }

    pub fn start_navigation(&self, route: Route) -> Result<(), NavError> {
        self.engine().start_navigation(route)
    }

    pub fn stop_navigation(&self) -> bool {
        self.engine().stop_navigation()
    }

    pub fn advance_waypoint(&self) -> Result<bool, NavError> {
        self.engine().advance_waypoint()
    }

    pub fn retreat_waypoint(&self) -> Result<bool, NavError> {
        self.engine().retreat_waypoint()
    }

    pub fn update_position(
        &self,
        fix: PositionFix,
        follow: bool,
    ) -> Result<Option<NavigationStatus>, NavError> {
        let outcome = self.engine().record_fix(fix, follow)?;
        if let Some(to) = outcome.follow_to {
            self.viewport.set_location(to.latitude, to.longitude, false)?;
        }
        Ok(outcome.status)
    }

    pub fn navigation_status(&self) -> Option<NavigationStatus> {
        self.engine().navigation_status()
    }

    pub fn declination(&self) -> f64 {
        self.engine().declination()
    }

    pub fn stats(&self) -> EngineStats {
        self.engine().stats()
    }

    /// Return the session to its initial state.
    pub fn clear(&self) {
        self.engine().clear();
    }
}

// ============================================================================
// Standalone Functions
// ============================================================================

/// Get default navigation configuration.
#[uniffi::export]
pub fn default_config() -> NavConfig {
    NavConfig::default()
}

/// Parse a configuration document; missing keys take defaults.
#[uniffi::export]
pub fn parse_config(json: String) -> Result<NavConfig, NavError> {
    NavConfig::from_json(&json)
}

/// Simplify a track without a session.
#[uniffi::export]
pub fn ffi_simplify_track(
    track: Track,
    strategy: SimplificationStrategy,
    sensitivity: f64,
    config: NavConfig,
) -> Result<Route, NavError> {
    init_logging();
    crate::simplify::simplify_track(&track, strategy, sensitivity, &config)
}

/// Load a persisted map index. `None` means the index is stale and the
/// host must re-index its maps.
#[uniffi::export]
pub fn ffi_load_map_index(
    json: String,
    current_hash: u64,
) -> Result<Option<Vec<MapDescriptor>>, NavError> {
    match MapCatalog::load_index(&json, current_hash)? {
        IndexLoad::Loaded(catalog) => Ok(Some(catalog.maps().to_vec())),
        IndexLoad::RebuildRequired { .. } => Ok(None),
    }
}

/// Serialize indexer output as a persisted map index.
#[uniffi::export]
pub fn ffi_map_index_json(maps: Vec<MapDescriptor>, hash: u64) -> Result<String, NavError> {
    MapCatalog::new(maps, hash).to_index_json()
}

#[uniffi::export]
pub fn ffi_distance(a: Coordinate, b: Coordinate) -> f64 {
    geo_utils::distance(&a, &b)
}

#[uniffi::export]
pub fn ffi_bearing(a: Coordinate, b: Coordinate) -> f64 {
    geo_utils::bearing(&a, &b)
}

/// Cross-track deviation; `None` when the point is not abeam the course.
#[uniffi::export]
pub fn ffi_cross_track_deviation(distance_to_ref: f64, course: f64, bearing_to_ref: f64) -> Option<f64> {
    geo_utils::cross_track_deviation(distance_to_ref, course, bearing_to_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::test_support::map;
    use std::sync::Weak;

    struct BlankRenderer;

    impl MapRenderer for BlankRenderer {
        fn activate(&self, _map: MapDescriptor) -> Option<String> {
            None
        }

        fn draw(
            &self,
            _map_id: MapId,
            _latitude: f64,
            _longitude: f64,
            _look_ahead_x: i32,
            _look_ahead_y: i32,
            _width: u32,
            _height: u32,
            _zoom: f64,
        ) -> DrawOutcome {
            DrawOutcome::Drawn
        }

        fn deactivate(&self, _map_id: MapId) {}
    }

    /// Callback that calls back into the session on every event.
    #[derive(Default)]
    struct Reentrant {
        session: Mutex<Weak<NavSession>>,
        reached: Mutex<Vec<bool>>,
    }

    struct ReentrantCallback(Arc<Reentrant>);

    impl ViewportCallback for ReentrantCallback {
        fn on_viewport_event(&self, _event: ViewportEvent) {
            let reached = self
                .0
                .session
                .lock()
                .unwrap()
                .upgrade()
                .is_some_and(|session| session.engine.try_lock().is_ok());
            self.0.reached.lock().unwrap().push(reached);
        }
    }

    #[test]
    fn test_callbacks_can_reenter_session() {
        let session = NavSession::new(
            NavConfig::default(),
            vec![map(1, 1, 0.0, 0.0, 1.0)],
            1,
            Box::new(BlankRenderer),
        )
        .unwrap();
        let state = Arc::new(Reentrant::default());
        *state.session.lock().unwrap() = Arc::downgrade(&session);
        session.add_viewport_callback(Box::new(ReentrantCallback(state.clone())));

        // Map 1, then the fallback map, then map 1 again
        assert!(session.ensure_visible(0.5, 0.5).unwrap());
        session
            .update_position(PositionFix::new(3.0, 3.0, 0), true)
            .unwrap();
        assert!(session.set_location(0.5, 0.5, false, true).unwrap());

        assert_eq!(*state.reached.lock().unwrap(), vec![true, true, true]);
        assert_eq!(session.current_map().map(|m| m.id), Some(MapId(1)));
        assert_eq!(session.stats().map_count, 1);
    }
}
