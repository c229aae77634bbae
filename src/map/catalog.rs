//! Map catalog with R-tree coverage lookup.
//!
//! The catalog is immutable once built. The viewport holds it behind an
//! `Arc` and swaps in a fresh one after the host re-indexes its maps.

use std::collections::HashMap;

use log::{info, warn};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use super::{MapDescriptor, MapId};
use crate::error::Result;
use crate::{Bounds, Coordinate};

/// Coverage envelope of one catalog entry, stored in the R-tree.
#[derive(Debug, Clone)]
struct MapEnvelope {
    slot: usize,
    bounds: Bounds,
}

impl RTreeObject for MapEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min_lng, self.bounds.min_lat],
            [self.bounds.max_lng, self.bounds.max_lat],
        )
    }
}

/// Persisted map index as written by [`MapCatalog::to_index_json`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapIndexFile {
    /// Hash of the map folder contents the index was built from
    pub hash: u64,
    pub maps: Vec<MapDescriptor>,
}

/// Outcome of loading a persisted index.
#[derive(Debug)]
pub enum IndexLoad {
    /// Index is current
    Loaded(MapCatalog),
    /// Map folder changed since the index was written; the host must re-index
    RebuildRequired { stored: u64, current: u64 },
}

/// Indexed collection of usable maps.
#[derive(Debug)]
pub struct MapCatalog {
    maps: Vec<MapDescriptor>,
    by_id: HashMap<MapId, usize>,
    index: RTree<MapEnvelope>,
    bad_maps: Vec<MapDescriptor>,
    hash: u64,
}

impl Default for MapCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

impl MapCatalog {
    /// Catalog without any maps; every location falls back to the blank map.
    pub fn empty() -> Self {
        Self {
            maps: Vec::new(),
            by_id: HashMap::new(),
            index: RTree::new(),
            bad_maps: Vec::new(),
            hash: 0,
        }
    }

    /// Build a catalog from indexer output.
    ///
    /// Descriptors carrying a `load_error`, using the reserved fallback id,
    /// repeating an id or with unusable bounds are set aside in
    /// [`MapCatalog::bad_maps`].
    pub fn new(descriptors: Vec<MapDescriptor>, hash: u64) -> Self {
        let mut maps: Vec<MapDescriptor> = Vec::with_capacity(descriptors.len());
        let mut by_id = HashMap::with_capacity(descriptors.len());
        let mut bad_maps = Vec::new();

        for mut map in descriptors {
            let problem = if let Some(err) = &map.load_error {
                Some(err.clone())
            } else if map.is_fallback() {
                Some("id 0 is reserved".to_string())
            } else if by_id.contains_key(&map.id) {
                Some("duplicate id".to_string())
            } else if !valid_bounds(&map.bounds) {
                Some("invalid bounds".to_string())
            } else if map.width == 0 || map.height == 0 {
                Some("empty raster".to_string())
            } else {
                None
            };

            if let Some(problem) = problem {
                warn!("[Catalog] Skipping map {} '{}': {}", map.id, map.title, problem);
                if map.load_error.is_none() {
                    map.load_error = Some(problem);
                }
                bad_maps.push(map);
                continue;
            }

            map.normalize_zoom_levels();
            by_id.insert(map.id, maps.len());
            maps.push(map);
        }

        let envelopes: Vec<MapEnvelope> = maps
            .iter()
            .enumerate()
            .map(|(slot, m)| MapEnvelope {
                slot,
                bounds: m.bounds,
            })
            .collect();

        info!(
            "[Catalog] Indexed {} maps ({} rejected), hash {}",
            maps.len(),
            bad_maps.len(),
            hash
        );

        Self {
            maps,
            by_id,
            index: RTree::bulk_load(envelopes),
            bad_maps,
            hash,
        }
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// All usable maps in indexer order.
    pub fn maps(&self) -> &[MapDescriptor] {
        &self.maps
    }

    pub fn get(&self, id: MapId) -> Option<&MapDescriptor> {
        self.by_id.get(&id).map(|&slot| &self.maps[slot])
    }

    /// Maps rejected while building the catalog.
    pub fn bad_maps(&self) -> &[MapDescriptor] {
        &self.bad_maps
    }

    /// Forget rejected maps, returning them so the host can delete their files.
    pub fn clean_bad_maps(&mut self) -> Vec<MapDescriptor> {
        std::mem::take(&mut self.bad_maps)
    }

    /// Maps covering a coordinate, most suitable first.
    ///
    /// Ordered by rank, then id, so equal ranks resolve deterministically.
    pub fn maps_covering(&self, coord: &Coordinate) -> Vec<&MapDescriptor> {
        let point = AABB::from_point([coord.longitude, coord.latitude]);
        let mut found: Vec<&MapDescriptor> = self
            .index
            .locate_in_envelope_intersecting(&point)
            .map(|e| &self.maps[e.slot])
            .filter(|m| m.covers(coord))
            .collect();
        found.sort_by_key(|m| (m.rank, m.id));
        found
    }

    /// Best map for a coordinate, if any covers it.
    pub fn best_map(&self, coord: &Coordinate) -> Option<&MapDescriptor> {
        self.maps_covering(coord).into_iter().next()
    }

    /// Serialize the catalog, rejected maps included, as a persisted index.
    pub fn to_index_json(&self) -> Result<String> {
        let file = MapIndexFile {
            hash: self.hash,
            maps: self.maps.iter().chain(self.bad_maps.iter()).cloned().collect(),
        };
        Ok(serde_json::to_string(&file)?)
    }

    /// Load a persisted index, checking it against the current folder hash.
    pub fn load_index(json: &str, current_hash: u64) -> Result<IndexLoad> {
        let file: MapIndexFile = serde_json::from_str(json)?;
        if file.hash != current_hash {
            info!(
                "[Catalog] Index is stale (stored {}, current {}), rebuild required",
                file.hash, current_hash
            );
            return Ok(IndexLoad::RebuildRequired {
                stored: file.hash,
                current: current_hash,
            });
        }
        Ok(IndexLoad::Loaded(MapCatalog::new(file.maps, file.hash)))
    }
}

fn valid_bounds(b: &Bounds) -> bool {
    [b.min_lat, b.max_lat, b.min_lng, b.max_lng]
        .iter()
        .all(|v| v.is_finite())
        && b.min_lat < b.max_lat
        && b.min_lng < b.max_lng
}
