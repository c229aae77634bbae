//! # Navigation Engine
//!
//! Application context for the navigation core. Owns everything a running
//! client works with:
//! - Recorded tracks and the routes derived from them
//! - Waypoints grouped into waypoint sets
//! - The viewport controller and its map catalog
//! - The route being navigated, if any
//! - Magnetic declination bookkeeping
//!
//! The context is constructed explicitly and passed to whoever needs it;
//! [`NavEngine::clear`] returns it to its initial state.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::{AngleType, NavConfig};
use crate::error::{NavError, Result};
use crate::geo_utils::normalize_bearing;
use crate::map::{MapCatalog, MapLoader, ViewportController};
use crate::navigation::{NavigationEngine, NavigationStatus, PositionFix};
use crate::simplify::{self, SimplificationStrategy};
use crate::worker::{self, WorkerHandle};
use crate::{Coordinate, Route, Track, Waypoint, WaypointSet, WaypointSetId};

/// Source of magnetic declination values (degrees, east positive).
pub trait DeclinationModel: Send + Sync {
    fn declination(&self, coord: &Coordinate) -> f64;
}

/// Engine statistics for monitoring.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct EngineStats {
    pub track_count: u32,
    pub route_count: u32,
    pub waypoint_count: u32,
    pub waypoint_set_count: u32,
    pub map_count: u32,
    pub navigating: bool,
}

/// Result of [`NavEngine::record_fix`].
#[derive(Debug, Clone, PartialEq)]
pub struct FixOutcome {
    /// Navigation status, when a route is being navigated
    pub status: Option<NavigationStatus>,
    /// Where the viewport should move to follow the fix
    pub follow_to: Option<Coordinate>,
}

/// Name of the waypoint set that always exists.
const DEFAULT_SET_NAME: &str = "Default";

/// The navigation application context.
pub struct NavEngine {
    config: NavConfig,

    // Entities
    tracks: Vec<Track>,
    routes: Vec<Route>,
    waypoints: Vec<Waypoint>,
    waypoint_sets: Vec<WaypointSet>,
    next_set_id: u32,

    // Map display
    viewport: Arc<ViewportController>,
    /// The viewport follows the live position
    centered_on: bool,

    // Navigation
    navigation: Option<NavigationEngine>,
    last_fix: Option<PositionFix>,

    // Declination
    declination_model: Option<Arc<dyn DeclinationModel>>,
    magnetic_declination: f64,
}

impl NavEngine {
    /// Create an engine over a map catalog and the host's map loader.
    pub fn new(config: NavConfig, catalog: MapCatalog, loader: Arc<dyn MapLoader>) -> Self {
        info!(
            "[NavEngine] Created with {} maps, proximity {} m",
            catalog.len(),
            config.proximity_m
        );
        Self {
            config,
            tracks: Vec::new(),
            routes: Vec::new(),
            waypoints: Vec::new(),
            waypoint_sets: vec![default_set()],
            next_set_id: 1,
            viewport: Arc::new(ViewportController::new(catalog, loader)),
            centered_on: false,
            navigation: None,
            last_fix: None,
            declination_model: None,
            magnetic_declination: 0.0,
        }
    }

    /// Use a declination model for magnetic bearings.
    pub fn with_declination_model(mut self, model: Arc<dyn DeclinationModel>) -> Self {
        self.declination_model = Some(model);
        self
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    /// Replace the configuration after validating it.
    pub fn set_config(&mut self, config: NavConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Shared handle to the viewport, for render threads and workers.
    pub fn viewport(&self) -> Arc<ViewportController> {
        Arc::clone(&self.viewport)
    }

    // ========================================================================
    // Tracks
    // ========================================================================

    /// Add a track, returning its index.
    pub fn add_track(&mut self, mut track: Track) -> usize {
        track.removed = false;
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    /// Remove a track. The returned track is flagged as removed.
    pub fn remove_track(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }
        let mut track = self.tracks.remove(index);
        track.removed = true;
        Some(track)
    }

    /// Remove all tracks, returning them flagged as removed.
    pub fn clear_tracks(&mut self) -> Vec<Track> {
        let mut removed = std::mem::take(&mut self.tracks);
        for track in &mut removed {
            track.removed = true;
        }
        removed
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    // ========================================================================
    // Routes
    // ========================================================================

    /// Add a route, returning its index.
    pub fn add_route(&mut self, mut route: Route) -> usize {
        route.removed = false;
        self.routes.push(route);
        self.routes.len() - 1
    }

    /// Remove a route. The returned route is flagged as removed.
    pub fn remove_route(&mut self, index: usize) -> Option<Route> {
        if index >= self.routes.len() {
            return None;
        }
        let mut route = self.routes.remove(index);
        route.removed = true;
        Some(route)
    }

    /// Remove all routes, returning them flagged as removed.
    pub fn clear_routes(&mut self) -> Vec<Route> {
        let mut removed = std::mem::take(&mut self.routes);
        for route in &mut removed {
            route.removed = true;
        }
        removed
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, index: usize) -> Option<&Route> {
        self.routes.get(index)
    }

    pub fn route_index(&self, name: &str) -> Option<usize> {
        self.routes.iter().position(|r| r.name == name)
    }

    // ========================================================================
    // Waypoints
    // ========================================================================

    /// Add a waypoint to the default set, returning its index.
    pub fn add_waypoint(&mut self, mut waypoint: Waypoint) -> usize {
        waypoint.set = Some(WaypointSetId::DEFAULT);
        self.waypoints.push(waypoint);
        self.waypoints.len() - 1
    }

    /// Add waypoints to a set (the default set when `None`).
    ///
    /// Unknown sets fall back to the default set. Returns the index of the
    /// last waypoint.
    pub fn add_waypoints(&mut self, waypoints: Vec<Waypoint>, set: Option<WaypointSetId>) -> usize {
        let set = match set {
            Some(id) if self.waypoint_set(id).is_some() => id,
            Some(id) => {
                warn!("[NavEngine] Unknown waypoint set {}, using default", id.0);
                WaypointSetId::DEFAULT
            }
            None => WaypointSetId::DEFAULT,
        };
        self.waypoints.extend(waypoints.into_iter().map(|mut w| {
            w.set = Some(set);
            w
        }));
        self.waypoints.len().saturating_sub(1)
    }

    pub fn remove_waypoint(&mut self, index: usize) -> Option<Waypoint> {
        if index >= self.waypoints.len() {
            return None;
        }
        Some(self.waypoints.remove(index))
    }

    pub fn clear_waypoints(&mut self) {
        self.waypoints.clear();
    }

    /// Remove the waypoints of the default set only.
    pub fn clear_default_waypoints(&mut self) {
        self.waypoints
            .retain(|w| w.set != Some(WaypointSetId::DEFAULT));
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn waypoints_in_set(&self, set: WaypointSetId) -> Vec<&Waypoint> {
        self.waypoints
            .iter()
            .filter(|w| w.set == Some(set))
            .collect()
    }

    pub fn default_waypoints(&self) -> Vec<&Waypoint> {
        self.waypoints_in_set(WaypointSetId::DEFAULT)
    }

    // ========================================================================
    // Waypoint Sets
    // ========================================================================

    /// Create a waypoint set.
    pub fn add_waypoint_set(&mut self, name: impl Into<String>) -> WaypointSetId {
        let id = WaypointSetId(self.next_set_id);
        self.next_set_id += 1;
        self.waypoint_sets.push(WaypointSet {
            id,
            name: name.into(),
        });
        id
    }

    pub fn waypoint_sets(&self) -> &[WaypointSet] {
        &self.waypoint_sets
    }

    pub fn waypoint_set(&self, id: WaypointSetId) -> Option<&WaypointSet> {
        self.waypoint_sets.iter().find(|s| s.id == id)
    }

    /// Remove a waypoint set together with its waypoints.
    ///
    /// The default set is never removed; `None` is returned for it and for
    /// unknown sets.
    pub fn remove_waypoint_set(&mut self, id: WaypointSetId) -> Option<WaypointSet> {
        if id == WaypointSetId::DEFAULT {
            warn!("[NavEngine] The default waypoint set cannot be removed");
            return None;
        }
        let pos = self.waypoint_sets.iter().position(|s| s.id == id)?;
        let set = self.waypoint_sets.remove(pos);
        self.waypoints.retain(|w| w.set != Some(id));
        Some(set)
    }

    // ========================================================================
    // Simplification
    // ========================================================================

    /// Derive a route from a track. `None` uses the configured strategy.
    pub fn simplify_track(
        &self,
        track: &Track,
        strategy: Option<SimplificationStrategy>,
        sensitivity: f64,
    ) -> Result<Route> {
        let strategy = strategy.unwrap_or(self.config.default_strategy);
        simplify::simplify_track(track, strategy, sensitivity, &self.config)
    }

    /// Derive a route from a track on a worker thread.
    pub fn simplify_track_in_background(
        &self,
        track: Track,
        strategy: Option<SimplificationStrategy>,
        sensitivity: f64,
    ) -> WorkerHandle<Result<Route>> {
        let strategy = strategy.unwrap_or(self.config.default_strategy);
        worker::simplify_in_background(track, strategy, sensitivity, self.config.clone())
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Start navigating a route, replacing any active navigation.
    pub fn start_navigation(&mut self, route: Route) -> Result<()> {
        let mut nav = NavigationEngine::new(route)?;
        if let Some(fix) = self.last_fix {
            nav.update(&fix);
        }
        self.navigation = Some(nav);
        Ok(())
    }

    /// Stop navigating. Returns whether a route was active.
    pub fn stop_navigation(&mut self) -> bool {
        let was_active = self.navigation.take().is_some();
        if was_active {
            info!("[NavEngine] Navigation stopped");
        }
        was_active
    }

    pub fn is_navigating(&self) -> bool {
        self.navigation.is_some()
    }

    pub fn navigation(&self) -> Option<&NavigationEngine> {
        self.navigation.as_ref()
    }

    pub fn navigation_status(&self) -> Option<NavigationStatus> {
        self.navigation.as_ref().and_then(|n| n.status().cloned())
    }

    pub fn advance_waypoint(&mut self) -> Result<bool> {
        self.refreshed(|nav| nav.advance_waypoint())
    }

    pub fn retreat_waypoint(&mut self) -> Result<bool> {
        self.refreshed(|nav| nav.retreat_waypoint())
    }

    /// Move the cursor and recompute the status against the last fix.
    fn refreshed(&mut self, step: impl FnOnce(&mut NavigationEngine) -> bool) -> Result<bool> {
        let nav = self.navigation.as_mut().ok_or(NavError::NoActiveRoute)?;
        let moved = step(nav);
        if let (true, Some(fix)) = (moved, self.last_fix) {
            nav.update(&fix);
        }
        Ok(moved)
    }

    /// Feed a live position fix.
    ///
    /// Updates the navigation status (when navigating) and, with `follow`,
    /// moves the viewport to the fix without forcing a better map. The
    /// status is stored before the viewport moves, so a map activation
    /// error leaves it available through [`NavEngine::navigation_status`].
    pub fn update_position(
        &mut self,
        fix: PositionFix,
        follow: bool,
    ) -> Result<Option<NavigationStatus>> {
        let outcome = self.record_fix(fix, follow)?;
        if let Some(to) = outcome.follow_to {
            self.viewport.set_location(to.latitude, to.longitude, false)?;
        }
        Ok(outcome.status)
    }

    /// The bookkeeping half of [`NavEngine::update_position`]: stores the
    /// fix and updates the status, but leaves the viewport alone.
    ///
    /// When the engine sits behind a lock, apply `follow_to` to the
    /// viewport after releasing it; viewport listeners run on that call.
    pub fn record_fix(&mut self, fix: PositionFix, follow: bool) -> Result<FixOutcome> {
        if !(fix.coord.latitude.is_finite() && fix.coord.longitude.is_finite()) {
            return Err(NavError::InvalidCoordinates {
                message: format!(
                    "fix at {},{} is not a position",
                    fix.coord.latitude, fix.coord.longitude
                ),
            });
        }
        let fix = PositionFix {
            coord: fix.coord.clamp(),
            ..fix
        };
        self.last_fix = Some(fix);

        let status = self.navigation.as_mut().map(|nav| nav.update(&fix));
        let follow_to = (follow && self.centered_on).then_some(fix.coord);
        Ok(FixOutcome { status, follow_to })
    }

    pub fn last_fix(&self) -> Option<&PositionFix> {
        self.last_fix.as_ref()
    }

    // ========================================================================
    // Location and Declination
    // ========================================================================

    /// Move the map location; see [`ViewportController::set_location`].
    ///
    /// With `update_declination` and magnetic angles configured, the
    /// declination is recomputed for the new location first.
    pub fn set_location(
        &mut self,
        latitude: f64,
        longitude: f64,
        find_best: bool,
        update_declination: bool,
    ) -> Result<bool> {
        let coord = self.note_location(latitude, longitude, update_declination);
        self.viewport
            .set_location(coord.latitude, coord.longitude, find_best)
    }

    /// The bookkeeping half of [`NavEngine::set_location`]: clamps the
    /// location and refreshes the declination, returning where the viewport
    /// should go.
    pub fn note_location(
        &mut self,
        latitude: f64,
        longitude: f64,
        update_declination: bool,
    ) -> Coordinate {
        let coord = Coordinate::clamped(latitude, longitude);
        if update_declination && self.config.angle_type == AngleType::Magnetic {
            self.refresh_declination(&coord);
        }
        coord
    }

    /// Show a coordinate and keep the viewport following the position.
    pub fn ensure_visible(&mut self, coord: Coordinate) -> Result<bool> {
        let changed = self.set_location(coord.latitude, coord.longitude, false, true)?;
        self.centered_on = true;
        Ok(changed)
    }

    pub fn is_centered(&self) -> bool {
        self.centered_on
    }

    pub fn set_centered(&mut self, centered: bool) {
        self.centered_on = centered;
    }

    /// Current magnetic declination in degrees.
    pub fn declination(&self) -> f64 {
        self.magnetic_declination
    }

    fn refresh_declination(&mut self, coord: &Coordinate) {
        if let Some(model) = &self.declination_model {
            self.magnetic_declination = model.declination(coord);
            debug!(
                "[NavEngine] Declination {:.2} at {:.4},{:.4}",
                self.magnetic_declination, coord.latitude, coord.longitude
            );
        }
    }

    /// Convert a magnetic angle to true when magnetic angles are in use.
    pub fn fix_declination(&self, angle: f64) -> f64 {
        match self.config.angle_type {
            AngleType::Magnetic => normalize_bearing(angle + self.magnetic_declination),
            AngleType::True => angle,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Return to the initial state: no entities, no navigation, no active map.
    ///
    /// Configuration, catalog, loader and declination model are kept.
    pub fn clear(&mut self) {
        self.clear_routes();
        self.clear_tracks();
        self.clear_waypoints();
        self.waypoint_sets = vec![default_set()];
        self.next_set_id = 1;
        self.navigation = None;
        self.last_fix = None;
        self.centered_on = false;
        self.viewport.reset();
        info!("[NavEngine] Cleared");
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            track_count: self.tracks.len() as u32,
            route_count: self.routes.len() as u32,
            waypoint_count: self.waypoints.len() as u32,
            waypoint_set_count: self.waypoint_sets.len() as u32,
            map_count: self.viewport.catalog().len() as u32,
            navigating: self.navigation.is_some(),
        }
    }
}

fn default_set() -> WaypointSet {
    WaypointSet {
        id: WaypointSetId::DEFAULT,
        name: DEFAULT_SET_NAME.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::test_support::{map, Call, RecordingLoader};
    use crate::map::{MapId, ViewportEvent, ViewportListener};
    use std::sync::{Mutex, Weak};
    use crate::TrackPoint;

    fn engine() -> (NavEngine, Arc<RecordingLoader>) {
        let loader = Arc::new(RecordingLoader::default());
        let catalog = MapCatalog::new(
            vec![map(1, 1, 0.0, 0.0, 1.0), map(2, 2, -1.0, -1.0, 3.0)],
            1,
        );
        (
            NavEngine::new(NavConfig::default(), catalog, loader.clone()),
            loader,
        )
    }

    fn sample_track(name: &str) -> Track {
        let mut track = Track::new(name);
        for i in 0..=10 {
            track.push(TrackPoint::new(0.0, i as f64 * 0.001, i * 1000));
        }
        for i in 1..=10 {
            track.push(TrackPoint::new(i as f64 * 0.001, 0.01, (10 + i) * 1000));
        }
        track
    }

    fn wpt(name: &str) -> Waypoint {
        Waypoint::new(name, Coordinate::new(0.5, 0.5), 50.0)
    }

    struct FixedDeclination(f64);

    impl DeclinationModel for FixedDeclination {
        fn declination(&self, _coord: &Coordinate) -> f64 {
            self.0
        }
    }

    #[test]
    fn test_engine_tracks() {
        let (mut engine, _) = engine();
        assert_eq!(engine.add_track(sample_track("a")), 0);
        assert_eq!(engine.add_track(sample_track("b")), 1);

        let removed = engine.remove_track(0).unwrap();
        assert!(removed.removed);
        assert_eq!(removed.name, "a");
        assert_eq!(engine.tracks().len(), 1);
        assert!(engine.remove_track(5).is_none());

        let cleared = engine.clear_tracks();
        assert_eq!(cleared.len(), 1);
        assert!(cleared.iter().all(|t| t.removed));
        assert!(engine.tracks().is_empty());
    }

    #[test]
    fn test_engine_routes() {
        let (mut engine, _) = engine();
        let route = engine.simplify_track(&sample_track("walk"), None, 1.0).unwrap();
        assert_eq!(route.waypoints.len(), 3);

        let index = engine.add_route(route);
        assert_eq!(engine.route_index("RT_walk"), Some(index));
        let removed = engine.remove_route(index).unwrap();
        assert!(removed.removed);
        assert!(engine.routes().is_empty());
    }

    #[test]
    fn test_engine_waypoint_sets() {
        let (mut engine, _) = engine();
        engine.add_waypoint(wpt("home"));
        let hiking = engine.add_waypoint_set("hiking");
        engine.add_waypoints(vec![wpt("hut"), wpt("summit")], Some(hiking));
        engine.add_waypoints(vec![wpt("lost")], Some(WaypointSetId(99)));

        assert_eq!(engine.waypoints().len(), 4);
        assert_eq!(engine.waypoints_in_set(hiking).len(), 2);
        assert_eq!(engine.default_waypoints().len(), 2);

        assert!(engine.remove_waypoint_set(WaypointSetId::DEFAULT).is_none());
        let removed = engine.remove_waypoint_set(hiking).unwrap();
        assert_eq!(removed.name, "hiking");
        assert_eq!(engine.waypoints().len(), 2);

        engine.clear_default_waypoints();
        assert!(engine.waypoints().is_empty());
        assert_eq!(engine.waypoint_sets().len(), 1);
    }

    #[test]
    fn test_engine_navigation_commands_need_route() {
        let (mut engine, _) = engine();
        assert!(matches!(engine.advance_waypoint(), Err(NavError::NoActiveRoute)));
        assert!(matches!(engine.retreat_waypoint(), Err(NavError::NoActiveRoute)));
        assert!(!engine.stop_navigation());
    }

    #[test]
    fn test_engine_rejects_non_finite_fix() {
        let (mut engine, _) = engine();
        let result = engine.update_position(PositionFix::new(f64::NAN, 7.0, 0), true);
        assert!(matches!(result, Err(NavError::InvalidCoordinates { .. })));
        assert!(engine.last_fix().is_none());
    }

    #[test]
    fn test_engine_navigation_follows_fixes() {
        let (mut engine, _) = engine();
        let route = engine.simplify_track(&sample_track("walk"), None, 1.0).unwrap();
        engine.start_navigation(route).unwrap();
        assert!(engine.is_navigating());

        // Near the start: arrival moves on to the corner
        let status = engine
            .update_position(PositionFix::new(0.0, 0.0001, 0).with_speed(1.5), false)
            .unwrap()
            .unwrap();
        assert_eq!(status.waypoint_index, 1);
        assert!(status.ete.is_some());

        assert!(engine.advance_waypoint().unwrap());
        let status = engine.navigation_status().unwrap();
        assert_eq!(status.waypoint_index, 2);
        assert!(!engine.advance_waypoint().unwrap());

        assert!(engine.stop_navigation());
        assert_eq!(engine.navigation_status(), None);
    }

    #[test]
    fn test_engine_follow_moves_viewport() {
        let (mut engine, loader) = engine();
        engine.ensure_visible(Coordinate::new(0.5, 0.5)).unwrap();
        assert!(engine.is_centered());
        assert_eq!(engine.viewport().current_map_id(), Some(MapId(1)));

        // Only map 2 covers this fix
        engine
            .update_position(PositionFix::new(-0.5, -0.5, 0), true)
            .unwrap();
        assert_eq!(engine.viewport().current_map_id(), Some(MapId(2)));
        assert!(loader.calls().contains(&Call::Deactivate(MapId(1))));

        // Not following: the viewport stays put
        engine.set_centered(false);
        engine
            .update_position(PositionFix::new(0.5, 0.5, 0), true)
            .unwrap();
        assert_eq!(engine.viewport().location(), Coordinate::new(-0.5, -0.5));
    }

    /// Listener that tries to reach the shared engine on every event.
    struct Reentrant {
        engine: Weak<Mutex<NavEngine>>,
        reached: Mutex<Vec<bool>>,
    }

    impl ViewportListener for Reentrant {
        fn on_viewport_event(&self, _event: &ViewportEvent) {
            let reached = self
                .engine
                .upgrade()
                .is_some_and(|engine| engine.try_lock().is_ok());
            self.reached.lock().unwrap().push(reached);
        }
    }

    #[test]
    fn test_engine_lock_free_while_viewport_follows() {
        let (engine, _) = engine();
        let viewport = engine.viewport();
        let shared = Arc::new(Mutex::new(engine));
        let listener = Arc::new(Reentrant {
            engine: Arc::downgrade(&shared),
            reached: Mutex::new(Vec::new()),
        });
        viewport.add_listener(listener.clone());

        let to = shared.lock().unwrap().note_location(0.5, 0.5, true);
        viewport.set_location(to.latitude, to.longitude, false).unwrap();
        shared.lock().unwrap().set_centered(true);

        let outcome = shared
            .lock()
            .unwrap()
            .record_fix(PositionFix::new(-0.5, -0.5, 0), true)
            .unwrap();
        let to = outcome.follow_to.unwrap();
        viewport.set_location(to.latitude, to.longitude, false).unwrap();

        assert_eq!(viewport.current_map_id(), Some(MapId(2)));
        assert_eq!(*listener.reached.lock().unwrap(), vec![true, true]);
    }

    #[test]
    fn test_record_fix_leaves_viewport_alone() {
        let (mut engine, loader) = engine();
        engine.set_centered(true);
        let outcome = engine
            .record_fix(PositionFix::new(0.5, 0.5, 0), true)
            .unwrap();
        assert_eq!(outcome.follow_to, Some(Coordinate::new(0.5, 0.5)));
        assert_eq!(outcome.status, None);
        assert_eq!(engine.viewport().current_map_id(), None);
        assert!(loader.calls().is_empty());

        engine.set_centered(false);
        let outcome = engine
            .record_fix(PositionFix::new(0.5, 0.5, 0), true)
            .unwrap();
        assert_eq!(outcome.follow_to, None);
    }

    #[test]
    fn test_engine_declination() {
        let (engine, _) = engine();
        let mut config = NavConfig::default();
        config.angle_type = AngleType::Magnetic;
        let mut engine = engine.with_declination_model(Arc::new(FixedDeclination(4.5)));

        // True angles: declination is not tracked
        engine.set_location(0.5, 0.5, true, true).unwrap();
        assert_eq!(engine.declination(), 0.0);
        assert_eq!(engine.fix_declination(358.0), 358.0);

        engine.set_config(config).unwrap();
        engine.set_location(0.5, 0.5, true, true).unwrap();
        assert_eq!(engine.declination(), 4.5);
        assert!((engine.fix_declination(358.0) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_engine_rejects_bad_config() {
        let (mut engine, _) = engine();
        let mut config = NavConfig::default();
        config.proximity_m = -1.0;
        assert!(matches!(
            engine.set_config(config),
            Err(NavError::ConfigError { .. })
        ));
        assert_eq!(engine.config().proximity_m, 50.0);
    }

    #[test]
    fn test_engine_clear() {
        let (mut engine, loader) = engine();
        engine.add_track(sample_track("a"));
        engine.add_route(Route::new("r"));
        engine.add_waypoint(wpt("w"));
        engine.add_waypoint_set("extra");
        engine.ensure_visible(Coordinate::new(0.5, 0.5)).unwrap();
        let route = engine.simplify_track(&sample_track("a"), None, 1.0).unwrap();
        engine.start_navigation(route).unwrap();

        engine.clear();

        let stats = engine.stats();
        assert_eq!(
            stats,
            EngineStats {
                track_count: 0,
                route_count: 0,
                waypoint_count: 0,
                waypoint_set_count: 1,
                map_count: 2,
                navigating: false,
            }
        );
        assert!(!engine.is_centered());
        assert_eq!(engine.viewport().current_map_id(), None);
        assert_eq!(loader.calls().last(), Some(&Call::Deactivate(MapId(1))));
    }

    #[test]
    fn test_engine_background_simplify() {
        let (engine, _) = engine();
        let route = engine
            .simplify_track_in_background(
                sample_track("bg"),
                Some(SimplificationStrategy::PeakElimination),
                1.0,
            )
            .recv()
            .unwrap()
            .unwrap();
        assert_eq!(route.waypoints.len(), 3);
    }
}
