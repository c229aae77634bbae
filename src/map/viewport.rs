//! Viewport controller: the single "current map" slot.
//!
//! Every operation that reads or changes the active map (activation,
//! deactivation, zoom, draw) runs under one `Mutex`. Listener notifications
//! are collected while the lock is held and delivered after it is released,
//! so listeners may call back into the controller.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, info, warn};

use super::{
    BlankSurface, MapCatalog, MapDescriptor, MapId, MapLoader, MapSurface, RenderError,
    RenderRequest,
};
use crate::error::{NavError, OptionExt, Result};
use crate::Coordinate;

/// Zoom comparisons within this margin count as equal.
const ZOOM_EPSILON: f64 = 1e-9;

/// Notification emitted by the viewport.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum ViewportEvent {
    /// A different map became current
    MapChanged {
        previous: Option<MapId>,
        current: MapId,
        zoom: f64,
    },
    /// The current map's zoom changed
    ZoomChanged { zoom: f64 },
    /// Drawing failed; out-of-memory is reported once until a draw succeeds
    RenderError { message: String },
}

/// Receives viewport notifications. Called without any viewport lock held.
pub trait ViewportListener: Send + Sync {
    fn on_viewport_event(&self, event: &ViewportEvent);
}

/// Activated map and its scale.
struct ActiveMap {
    descriptor: MapDescriptor,
    surface: Box<dyn MapSurface>,
    zoom: f64,
}

/// State guarded by the viewport lock.
struct MapSlot {
    current: Option<ActiveMap>,
    /// Maps covering `location`, most suitable first
    suitable: Vec<MapId>,
    location: Coordinate,
    /// An out-of-memory report is pending acknowledgement by a good draw
    memory_warning: bool,
}

/// Picks, activates and zooms the map for a moving location.
pub struct ViewportController {
    catalog: RwLock<Arc<MapCatalog>>,
    loader: Arc<dyn MapLoader>,
    slot: Mutex<MapSlot>,
    listeners: RwLock<Vec<Arc<dyn ViewportListener>>>,
}

impl ViewportController {
    pub fn new(catalog: MapCatalog, loader: Arc<dyn MapLoader>) -> Self {
        Self {
            catalog: RwLock::new(Arc::new(catalog)),
            loader,
            slot: Mutex::new(MapSlot {
                current: None,
                suitable: Vec::new(),
                location: Coordinate::new(0.0, 0.0),
                memory_warning: false,
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    pub fn add_listener(&self, listener: Arc<dyn ViewportListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Remove a listener previously added (compared by identity).
    pub fn remove_listener(&self, listener: &Arc<dyn ViewportListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn notify(&self, events: Vec<ViewportEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for event in &events {
            for listener in &listeners {
                listener.on_viewport_event(event);
            }
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, MapSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| {
            warn!("[Viewport] Map lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `op` under the map lock and deliver its events afterwards.
    fn with_slot<T>(&self, op: impl FnOnce(&mut MapSlot, &mut Vec<ViewportEvent>) -> T) -> T {
        let mut events = Vec::new();
        let result = {
            let mut slot = self.lock_slot();
            op(&mut slot, &mut events)
        };
        self.notify(events);
        result
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    /// Current catalog snapshot.
    pub fn catalog(&self) -> Arc<MapCatalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Install a freshly built catalog.
    ///
    /// The suitable set is recomputed; if the current map is no longer in
    /// the catalog the best map for the location is selected. Returns
    /// whether the map changed.
    pub fn replace_catalog(&self, catalog: MapCatalog) -> Result<bool> {
        let catalog = Arc::new(catalog);
        *self.catalog.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&catalog);
        info!("[Viewport] Catalog replaced ({} maps)", catalog.len());

        let (location, orphaned) = {
            let mut slot = self.lock_slot();
            slot.suitable = suitable_ids(&catalog, &slot.location);
            let orphaned = slot
                .current
                .as_ref()
                .is_some_and(|m| !m.descriptor.is_fallback() && catalog.get(m.descriptor.id).is_none());
            (slot.location, orphaned)
        };

        if orphaned {
            self.set_location(location.latitude, location.longitude, true)
        } else {
            Ok(false)
        }
    }

    // ========================================================================
    // Location and map selection
    // ========================================================================

    /// Move the viewport to a location, switching maps if needed.
    ///
    /// The coordinate is clamped into range. With `find_best` false the
    /// current map is kept as long as it still covers the location; otherwise
    /// the most suitable covering map (or the blank fallback) is activated.
    /// Returns whether the current map changed. On activation failure the
    /// previous map stays current and the error is returned.
    pub fn set_location(&self, latitude: f64, longitude: f64, find_best: bool) -> Result<bool> {
        let coord = Coordinate::clamped(latitude, longitude);
        let catalog = self.catalog();

        self.with_slot(|slot, events| {
            slot.location = coord;
            slot.suitable = suitable_ids(&catalog, &coord);

            let keep = !find_best
                && slot
                    .current
                    .as_ref()
                    .is_some_and(|m| !m.descriptor.is_fallback() && m.descriptor.covers(&coord));
            if keep {
                return Ok(false);
            }

            let candidate = slot
                .suitable
                .first()
                .and_then(|id| catalog.get(*id))
                .cloned()
                .unwrap_or_else(MapDescriptor::fallback);

            if current_id(slot) == Some(candidate.id) {
                return Ok(false);
            }
            self.swap(slot, candidate, events)?;
            Ok(true)
        })
    }

    /// Make a map from the current suitable set current.
    ///
    /// Selecting the current map is a no-op returning `false`.
    pub fn select_map(&self, id: MapId) -> Result<bool> {
        let catalog = self.catalog();
        self.with_slot(|slot, events| {
            if current_id(slot) == Some(id) {
                return Ok(false);
            }
            if !slot.suitable.contains(&id) {
                return Err(NavError::MapNotAvailable { map_id: id });
            }
            let candidate = catalog.get(id).cloned().ok_or_map_not_available(id)?;
            self.swap(slot, candidate, events)?;
            Ok(true)
        })
    }

    /// Switch to the next less suitable covering map.
    ///
    /// `false` on the least suitable map. Without a current map this picks
    /// the least suitable one.
    pub fn next_map(&self) -> Result<bool> {
        self.step_map(1)
    }

    /// Switch to the next more suitable covering map.
    ///
    /// `false` on the most suitable map. Without a current map this picks
    /// the most suitable one.
    pub fn prev_map(&self) -> Result<bool> {
        self.step_map(-1)
    }

    fn step_map(&self, step: isize) -> Result<bool> {
        let catalog = self.catalog();
        self.with_slot(|slot, events| {
            let count = slot.suitable.len() as isize;
            if count == 0 {
                return Ok(false);
            }
            let target = match current_id(slot) {
                Some(id) => {
                    let Some(pos) = slot.suitable.iter().position(|s| *s == id) else {
                        return Ok(false);
                    };
                    let next = pos as isize + step;
                    if next < 0 || next >= count {
                        return Ok(false);
                    }
                    next as usize
                }
                None if step > 0 => (count - 1) as usize,
                None => 0,
            };
            let id = slot.suitable[target];
            if current_id(slot) == Some(id) {
                return Ok(false);
            }
            let candidate = catalog.get(id).cloned().ok_or_map_not_available(id)?;
            self.swap(slot, candidate, events)?;
            Ok(true)
        })
    }

    /// Activate any catalog map, moving the location to its center if the
    /// map does not cover it.
    pub fn load_map(&self, id: MapId) -> Result<bool> {
        let catalog = self.catalog();
        self.with_slot(|slot, events| {
            let candidate = catalog.get(id).cloned().ok_or_map_not_available(id)?;
            if current_id(slot) == Some(id) {
                return Ok(false);
            }
            let center = candidate.bounds.center();
            let covers = candidate.covers(&slot.location);
            self.swap(slot, candidate, events)?;
            if !covers {
                debug!("[Viewport] Re-centring on map {}", id);
                slot.location = center;
                slot.suitable = suitable_ids(&catalog, &center);
            }
            Ok(true)
        })
    }

    /// Pan by a pixel offset on the current map.
    ///
    /// The new location is computed through the map's projection at the
    /// current zoom and applied with `find_best` false. Returns whether the
    /// map changed.
    pub fn scroll_map(&self, dx: f64, dy: f64) -> Result<bool> {
        let target = {
            let slot = self.lock_slot();
            let Some(active) = slot.current.as_ref() else {
                return Ok(false);
            };
            let (x, y) = active.descriptor.xy_by_lat_lon(&slot.location, active.zoom);
            active.descriptor.lat_lon_by_xy(x + dx, y + dy, active.zoom)
        };
        self.set_location(target.latitude, target.longitude, false)
    }

    /// Deactivate the current map and forget the location's suitable set.
    pub fn reset(&self) {
        let mut slot = self.lock_slot();
        if let Some(mut active) = slot.current.take() {
            active.surface.deactivate();
            debug!("[Viewport] Map {} deactivated on reset", active.descriptor.id);
        }
        slot.suitable.clear();
        slot.memory_warning = false;
    }

    /// Swap protocol. The caller holds the map lock.
    ///
    /// The candidate is activated first; only on success is the previous map
    /// deactivated and the candidate installed.
    fn swap(
        &self,
        slot: &mut MapSlot,
        candidate: MapDescriptor,
        events: &mut Vec<ViewportEvent>,
    ) -> Result<()> {
        let surface: Box<dyn MapSurface> = if candidate.is_fallback() {
            Box::new(BlankSurface)
        } else {
            self.loader.activate(&candidate).map_err(|message| {
                warn!(
                    "[Viewport] Failed to activate map {} '{}': {}",
                    candidate.id, candidate.title, message
                );
                NavError::MapActivationFailed {
                    map_id: candidate.id,
                    message,
                }
            })?
        };

        let previous = slot.current.take();
        let zoom = match &previous {
            Some(prev) => candidate.nearest_zoom(prev.zoom),
            None => candidate.initial_zoom(),
        };
        let previous_id = previous.map(|mut prev| {
            prev.surface.deactivate();
            prev.descriptor.id
        });

        info!(
            "[Viewport] Map {} '{}' active at zoom {}",
            candidate.id, candidate.title, zoom
        );
        events.push(ViewportEvent::MapChanged {
            previous: previous_id,
            current: candidate.id,
            zoom,
        });
        slot.current = Some(ActiveMap {
            descriptor: candidate,
            surface,
            zoom,
        });
        Ok(())
    }

    // ========================================================================
    // Zoom
    // ========================================================================

    /// Zoom of the current map, if any.
    pub fn zoom(&self) -> Option<f64> {
        self.lock_slot().current.as_ref().map(|m| m.zoom)
    }

    /// Next larger zoom level, without changing anything.
    pub fn next_zoom(&self) -> Option<f64> {
        let slot = self.lock_slot();
        let active = slot.current.as_ref()?;
        active
            .descriptor
            .zoom_levels
            .iter()
            .copied()
            .find(|z| *z > active.zoom + ZOOM_EPSILON)
    }

    /// Next smaller zoom level, without changing anything.
    pub fn prev_zoom(&self) -> Option<f64> {
        let slot = self.lock_slot();
        let active = slot.current.as_ref()?;
        active
            .descriptor
            .zoom_levels
            .iter()
            .rev()
            .copied()
            .find(|z| *z < active.zoom - ZOOM_EPSILON)
    }

    /// Step to the next larger zoom level. `false` at the top level.
    pub fn zoom_in(&self) -> bool {
        self.step_zoom(true)
    }

    /// Step to the next smaller zoom level. `false` at the bottom level.
    pub fn zoom_out(&self) -> bool {
        self.step_zoom(false)
    }

    fn step_zoom(&self, larger: bool) -> bool {
        self.with_slot(|slot, events| {
            let Some(active) = slot.current.as_mut() else {
                return false;
            };
            let levels = &active.descriptor.zoom_levels;
            let next = if larger {
                levels.iter().copied().find(|z| *z > active.zoom + ZOOM_EPSILON)
            } else {
                levels.iter().rev().copied().find(|z| *z < active.zoom - ZOOM_EPSILON)
            };
            match next {
                Some(zoom) => {
                    active.zoom = zoom;
                    events.push(ViewportEvent::ZoomChanged { zoom });
                    true
                }
                None => false,
            }
        })
    }

    /// Scale the zoom by `factor`, bounded by the map's zoom range.
    ///
    /// Returns `false` when the zoom does not change (bound reached, no map,
    /// or a factor that is not a positive number).
    pub fn zoom_by(&self, factor: f64) -> bool {
        if !(factor.is_finite() && factor > 0.0) {
            return false;
        }
        self.with_slot(|slot, events| {
            let Some(active) = slot.current.as_mut() else {
                return false;
            };
            let zoom = (active.zoom * factor)
                .clamp(active.descriptor.min_zoom(), active.descriptor.max_zoom());
            if (zoom - active.zoom).abs() <= ZOOM_EPSILON {
                return false;
            }
            active.zoom = zoom;
            events.push(ViewportEvent::ZoomChanged { zoom });
            true
        })
    }

    // ========================================================================
    // Drawing
    // ========================================================================

    /// Draw the current map.
    ///
    /// Returns `Ok(true)` when something was drawn and `Ok(false)` when there
    /// is no map or the frame was skipped for lack of memory. Out-of-memory
    /// is reported once through [`ViewportEvent::RenderError`] and stays
    /// silent until a draw succeeds again.
    pub fn render(&self, request: &RenderRequest) -> Result<bool> {
        self.with_slot(|slot, events| {
            let Some(active) = slot.current.as_mut() else {
                return Ok(false);
            };
            match active.surface.draw(request, active.zoom) {
                Ok(()) => {
                    slot.memory_warning = false;
                    Ok(true)
                }
                Err(RenderError::OutOfMemory) => {
                    if !slot.memory_warning {
                        warn!("[Viewport] Out of memory drawing map {}", active.descriptor.id);
                        slot.memory_warning = true;
                        events.push(ViewportEvent::RenderError {
                            message: format!(
                                "Not enough memory to draw map '{}'",
                                active.descriptor.title
                            ),
                        });
                    }
                    Ok(false)
                }
                Err(RenderError::Failed(message)) => Err(NavError::RenderFailed { message }),
            }
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Descriptor of the current map.
    pub fn current_map(&self) -> Option<MapDescriptor> {
        self.lock_slot().current.as_ref().map(|m| m.descriptor.clone())
    }

    pub fn current_map_id(&self) -> Option<MapId> {
        current_id(&self.lock_slot())
    }

    /// Maps covering the current location, most suitable first.
    pub fn suitable_maps(&self) -> Vec<MapDescriptor> {
        let catalog = self.catalog();
        let ids = self.lock_slot().suitable.clone();
        ids.iter().filter_map(|id| catalog.get(*id).cloned()).collect()
    }

    pub fn location(&self) -> Coordinate {
        self.lock_slot().location
    }

    /// Whether a coordinate is inside the current map.
    pub fn covers(&self, coord: &Coordinate) -> bool {
        self.lock_slot()
            .current
            .as_ref()
            .is_some_and(|m| m.descriptor.covers(coord))
    }
}

fn current_id(slot: &MapSlot) -> Option<MapId> {
    slot.current.as_ref().map(|m| m.descriptor.id)
}

fn suitable_ids(catalog: &MapCatalog, coord: &Coordinate) -> Vec<MapId> {
    catalog.maps_covering(coord).iter().map(|m| m.id).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::super::test_support::{map, Call, RecordingLoader};
    use super::*;

    struct EventLog(Mutex<Vec<ViewportEvent>>);

    impl ViewportListener for EventLog {
        fn on_viewport_event(&self, event: &ViewportEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn setup() -> (ViewportController, Arc<RecordingLoader>, Arc<EventLog>) {
        let catalog = MapCatalog::new(
            vec![
                map(1, 1, 46.0, 7.0, 1.0),
                map(2, 3, 45.0, 6.0, 3.0),
                map(3, 2, 46.0, 7.0, 1.5),
            ],
            1,
        );
        let loader = Arc::new(RecordingLoader::default());
        let viewport = ViewportController::new(catalog, loader.clone());
        let log = Arc::new(EventLog(Mutex::new(Vec::new())));
        viewport.add_listener(log.clone());
        (viewport, loader, log)
    }

    fn request() -> RenderRequest {
        RenderRequest {
            location: Coordinate::new(46.5, 7.5),
            look_ahead: (0, 0),
            width: 480,
            height: 800,
        }
    }

    #[test]
    fn test_set_location_picks_top_ranked() {
        let (viewport, loader, log) = setup();
        assert!(viewport.set_location(46.5, 7.5, true).unwrap());
        assert_eq!(viewport.current_map_id(), Some(MapId(1)));
        assert_eq!(loader.calls(), vec![Call::Activate(MapId(1))]);

        let suitable: Vec<MapId> = viewport.suitable_maps().iter().map(|m| m.id).collect();
        assert_eq!(suitable, vec![MapId(1), MapId(3), MapId(2)]);
        assert_eq!(log.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_same_best_map_is_not_reactivated() {
        let (viewport, loader, _) = setup();
        viewport.set_location(46.5, 7.5, true).unwrap();
        assert!(!viewport.set_location(46.6, 7.6, true).unwrap());
        assert_eq!(loader.calls().len(), 1);
    }

    #[test]
    fn test_moving_off_map_switches_once() {
        let (viewport, loader, log) = setup();
        viewport.set_location(46.5, 7.5, true).unwrap();
        log.0.lock().unwrap().clear();

        // Only map 2 covers this point
        assert!(viewport.set_location(45.2, 6.2, false).unwrap());
        assert_eq!(viewport.current_map_id(), Some(MapId(2)));
        assert_eq!(
            loader.calls(),
            vec![
                Call::Activate(MapId(1)),
                Call::Activate(MapId(2)),
                Call::Deactivate(MapId(1)),
            ]
        );
        let events = log.0.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ViewportEvent::MapChanged {
                previous: Some(MapId(1)),
                current: MapId(2),
                ..
            }
        ));
    }

    #[test]
    fn test_keep_current_map_without_find_best() {
        let (viewport, loader, _) = setup();
        viewport.select_map(MapId(3)).unwrap_err();
        viewport.set_location(46.5, 7.5, true).unwrap();
        viewport.select_map(MapId(3)).unwrap();
        assert!(!viewport.set_location(46.7, 7.7, false).unwrap());
        assert_eq!(viewport.current_map_id(), Some(MapId(3)));
        assert_eq!(loader.calls().len(), 3);
    }

    #[test]
    fn test_fallback_when_nothing_covers() {
        let (viewport, loader, _) = setup();
        assert!(viewport.set_location(10.0, 10.0, false).unwrap());
        let current = viewport.current_map().unwrap();
        assert!(current.is_fallback());
        assert!(loader.calls().is_empty());

        // A real map replaces the fallback even without find_best
        assert!(viewport.set_location(46.5, 7.5, false).unwrap());
        assert_eq!(viewport.current_map_id(), Some(MapId(1)));
    }

    #[test]
    fn test_location_is_clamped() {
        let (viewport, _, _) = setup();
        viewport.set_location(123.0, -500.0, true).unwrap();
        assert_eq!(viewport.location(), Coordinate::new(90.0, -180.0));
    }

    #[test]
    fn test_activation_failure_keeps_previous() {
        let (viewport, loader, log) = setup();
        viewport.set_location(46.5, 7.5, true).unwrap();
        loader.fail(MapId(2));
        log.0.lock().unwrap().clear();

        let err = viewport.set_location(45.2, 6.2, false).unwrap_err();
        assert!(matches!(
            err,
            NavError::MapActivationFailed { map_id: MapId(2), .. }
        ));
        assert_eq!(viewport.current_map_id(), Some(MapId(1)));
        assert!(!loader.calls().contains(&Call::Deactivate(MapId(1))));
        assert!(log.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_select_map_rules() {
        let (viewport, _, _) = setup();
        viewport.set_location(46.5, 7.5, true).unwrap();

        assert!(!viewport.select_map(MapId(1)).unwrap());
        assert!(viewport.select_map(MapId(2)).unwrap());
        assert!(matches!(
            viewport.select_map(MapId(99)),
            Err(NavError::MapNotAvailable { map_id: MapId(99) })
        ));
    }

    #[test]
    fn test_next_and_prev_map_stop_at_ends() {
        let (viewport, _, _) = setup();
        assert!(!viewport.next_map().unwrap());
        viewport.set_location(46.5, 7.5, true).unwrap();

        assert!(!viewport.prev_map().unwrap());
        assert_eq!(viewport.current_map_id(), Some(MapId(1)));
        assert!(viewport.next_map().unwrap());
        assert_eq!(viewport.current_map_id(), Some(MapId(3)));
        assert!(viewport.next_map().unwrap());
        assert_eq!(viewport.current_map_id(), Some(MapId(2)));
        assert!(!viewport.next_map().unwrap());
        assert_eq!(viewport.current_map_id(), Some(MapId(2)));
        assert!(viewport.prev_map().unwrap());
        assert_eq!(viewport.current_map_id(), Some(MapId(3)));
    }

    #[test]
    fn test_load_map_recentres_location() {
        let (viewport, _, _) = setup();
        viewport.set_location(10.0, 10.0, true).unwrap();
        assert!(viewport.load_map(MapId(1)).unwrap());
        assert_eq!(viewport.location(), Coordinate::new(46.5, 7.5));
        assert_eq!(viewport.suitable_maps().len(), 3);
        assert!(!viewport.load_map(MapId(1)).unwrap());
        assert!(viewport.load_map(MapId(42)).is_err());
    }

    #[test]
    fn test_zoom_bounds() {
        let (viewport, _, log) = setup();
        assert!(!viewport.zoom_in());
        assert_eq!(viewport.zoom(), None);

        viewport.set_location(46.5, 7.5, true).unwrap();
        assert_eq!(viewport.zoom(), Some(1.0));
        assert_eq!(viewport.next_zoom(), Some(2.0));
        assert_eq!(viewport.prev_zoom(), Some(0.5));

        assert!(viewport.zoom_in());
        assert!(!viewport.zoom_in());
        assert_eq!(viewport.next_zoom(), None);
        assert_eq!(viewport.zoom(), Some(2.0));

        assert!(viewport.zoom_out());
        assert!(viewport.zoom_out());
        assert!(!viewport.zoom_out());
        assert_eq!(viewport.zoom(), Some(0.5));

        let zoom_events = log
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ViewportEvent::ZoomChanged { .. }))
            .count();
        assert_eq!(zoom_events, 3);
    }

    #[test]
    fn test_zoom_by_clamps() {
        let (viewport, _, _) = setup();
        viewport.set_location(46.5, 7.5, true).unwrap();
        assert!(viewport.zoom_by(1.5));
        assert_eq!(viewport.zoom(), Some(1.5));
        assert!(viewport.zoom_by(10.0));
        assert_eq!(viewport.zoom(), Some(2.0));
        assert!(!viewport.zoom_by(3.0));
        assert!(!viewport.zoom_by(0.0));
        assert!(!viewport.zoom_by(f64::NAN));
    }

    #[test]
    fn test_zoom_carries_over_to_next_map() {
        let (viewport, _, _) = setup();
        viewport.set_location(46.5, 7.5, true).unwrap();
        viewport.zoom_in();
        viewport.select_map(MapId(3)).unwrap();
        assert_eq!(viewport.zoom(), Some(2.0));
    }

    #[test]
    fn test_render_out_of_memory_reported_once() {
        let (viewport, loader, log) = setup();
        assert!(!viewport.render(&request()).unwrap());

        viewport.set_location(46.5, 7.5, true).unwrap();
        assert!(viewport.render(&request()).unwrap());

        loader.set_out_of_memory(true);
        assert!(!viewport.render(&request()).unwrap());
        assert!(!viewport.render(&request()).unwrap());
        let errors = |log: &Arc<EventLog>| {
            log.0
                .lock()
                .unwrap()
                .iter()
                .filter(|e| matches!(e, ViewportEvent::RenderError { .. }))
                .count()
        };
        assert_eq!(errors(&log), 1);

        // A good frame clears the flag; the next failure reports again
        loader.set_out_of_memory(false);
        assert!(viewport.render(&request()).unwrap());
        loader.set_out_of_memory(true);
        viewport.render(&request()).unwrap();
        assert_eq!(errors(&log), 2);

        // Controller state survives
        assert_eq!(viewport.current_map_id(), Some(MapId(1)));
        assert_eq!(viewport.zoom(), Some(1.0));
    }

    #[test]
    fn test_scroll_map_pans_location() {
        let (viewport, _, _) = setup();
        viewport.set_location(46.5, 7.5, true).unwrap();
        // 2000 px per degree at zoom 1
        assert!(!viewport.scroll_map(200.0, -200.0).unwrap());
        let loc = viewport.location();
        assert!((loc.longitude - 7.6).abs() < 1e-9);
        assert!((loc.latitude - 46.6).abs() < 1e-9);
    }

    #[test]
    fn test_replace_catalog_drops_missing_map() {
        let (viewport, loader, _) = setup();
        viewport.set_location(46.5, 7.5, true).unwrap();
        let changed = viewport
            .replace_catalog(MapCatalog::new(vec![map(3, 1, 46.0, 7.0, 1.5)], 2))
            .unwrap();
        assert!(changed);
        assert_eq!(viewport.current_map_id(), Some(MapId(3)));
        assert!(loader.calls().contains(&Call::Deactivate(MapId(1))));
        assert_eq!(viewport.catalog().hash(), 2);
    }

    #[test]
    fn test_reset_deactivates() {
        let (viewport, loader, _) = setup();
        viewport.set_location(46.5, 7.5, true).unwrap();
        viewport.reset();
        assert_eq!(viewport.current_map_id(), None);
        assert!(viewport.suitable_maps().is_empty());
        assert_eq!(loader.calls().last(), Some(&Call::Deactivate(MapId(1))));
    }

    #[test]
    fn test_listener_can_reenter() {
        struct Reentrant(Arc<ViewportController>, Mutex<Option<f64>>);
        impl ViewportListener for Reentrant {
            fn on_viewport_event(&self, _event: &ViewportEvent) {
                *self.1.lock().unwrap() = self.0.zoom();
            }
        }

        let loader = Arc::new(RecordingLoader::default());
        let viewport = Arc::new(ViewportController::new(
            MapCatalog::new(vec![map(1, 1, 0.0, 0.0, 1.0)], 0),
            loader,
        ));
        let listener = Arc::new(Reentrant(viewport.clone(), Mutex::new(None)));
        viewport.add_listener(listener.clone());
        viewport.set_location(0.5, 0.5, true).unwrap();
        assert_eq!(*listener.1.lock().unwrap(), Some(1.0));

        let as_dyn: Arc<dyn ViewportListener> = listener.clone();
        viewport.remove_listener(&as_dyn);
        viewport.zoom_in();
        assert_eq!(*listener.1.lock().unwrap(), Some(1.0));
    }

    /// Flags any overlap between activation, drawing and deactivation, and
    /// any draw on a surface that was already deactivated.
    #[derive(Default)]
    struct ExclusiveCheck {
        busy: AtomicBool,
        violations: AtomicUsize,
    }

    impl ExclusiveCheck {
        fn enter(&self) {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_micros(20));
            self.busy.store(false, Ordering::SeqCst);
        }
    }

    struct CheckedLoader(Arc<ExclusiveCheck>);

    struct CheckedSurface {
        check: Arc<ExclusiveCheck>,
        deactivated: bool,
    }

    impl MapLoader for CheckedLoader {
        fn activate(
            &self,
            _map: &MapDescriptor,
        ) -> std::result::Result<Box<dyn MapSurface>, String> {
            self.0.enter();
            Ok(Box::new(CheckedSurface {
                check: self.0.clone(),
                deactivated: false,
            }))
        }
    }

    impl MapSurface for CheckedSurface {
        fn draw(
            &mut self,
            _request: &RenderRequest,
            _zoom: f64,
        ) -> std::result::Result<(), RenderError> {
            if self.deactivated {
                self.check.violations.fetch_add(1, Ordering::SeqCst);
            }
            self.check.enter();
            Ok(())
        }

        fn deactivate(&mut self) {
            self.check.enter();
            self.deactivated = true;
        }
    }

    #[test]
    fn test_render_swap_and_zoom_are_exclusive() {
        let check = Arc::new(ExclusiveCheck::default());
        let catalog = MapCatalog::new(
            vec![
                map(1, 1, 46.0, 7.0, 1.0),
                map(2, 3, 45.0, 6.0, 3.0),
                map(3, 2, 46.0, 7.0, 1.5),
            ],
            1,
        );
        let viewport = Arc::new(ViewportController::new(
            catalog,
            Arc::new(CheckedLoader(check.clone())),
        ));
        viewport.set_location(46.5, 7.5, true).unwrap();

        let renderer = {
            let viewport = viewport.clone();
            thread::spawn(move || {
                let mut drawn = 0;
                for _ in 0..300 {
                    if viewport.render(&request()).unwrap() {
                        drawn += 1;
                    }
                }
                drawn
            })
        };

        for i in 0..60 {
            match i % 4 {
                0 => viewport.select_map(MapId(3)).map(|_| ()).unwrap(),
                1 => {
                    viewport.zoom_in();
                }
                2 => viewport.set_location(46.5, 7.5, true).map(|_| ()).unwrap(),
                _ => {
                    viewport.zoom_out();
                }
            }
        }

        let drawn = renderer.join().unwrap();
        assert_eq!(drawn, 300);
        assert_eq!(check.violations.load(Ordering::SeqCst), 0);
    }
}

