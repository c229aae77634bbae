//! Background execution for long-running operations.
//!
//! Simplifying a long track, building a map catalog and switching maps can
//! each take long enough to stall position updates. These helpers run them
//! on a plain thread and hand back a [`WorkerHandle`] to poll or wait on.

use std::sync::mpsc::{self, RecvError, TryRecvError};
use std::sync::Arc;
use std::thread;

use log::{debug, warn};

use crate::error::{NavError, Result};
use crate::map::{MapCatalog, MapDescriptor, ViewportController};
use crate::simplify::{simplify_track, SimplificationStrategy};
use crate::{NavConfig, Route, Track};

/// Completion handle for a background job.
pub struct WorkerHandle<T> {
    task: String,
    receiver: mpsc::Receiver<T>,
}

impl<T> WorkerHandle<T> {
    /// Name of the job, as used in log lines.
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Check if the job is done (non-blocking).
    ///
    /// `Ok(None)` while it is still running.
    pub fn try_recv(&self) -> Result<Option<T>> {
        match self.receiver.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.disconnected()),
        }
    }

    /// Wait for the job to finish (blocking).
    pub fn recv(self) -> Result<T> {
        self.receiver
            .recv()
            .map_err(|RecvError| self.disconnected())
    }

    fn disconnected(&self) -> NavError {
        NavError::WorkerDisconnected {
            task: self.task.clone(),
        }
    }
}

/// Run `job` on a named thread.
///
/// If the thread cannot be started the handle reports
/// [`NavError::WorkerDisconnected`].
pub fn spawn<T, F>(task: impl Into<String>, job: F) -> WorkerHandle<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let task = task.into();
    let (tx, rx) = mpsc::channel();
    let name = task.clone();

    let spawned = thread::Builder::new()
        .name(format!("trailnav-{}", task))
        .spawn(move || {
            let start = std::time::Instant::now();
            let value = job();
            debug!("[Worker] '{}' finished in {:?}", name, start.elapsed());
            tx.send(value).ok();
        });
    if let Err(e) = spawned {
        warn!("[Worker] Could not start '{}': {}", task, e);
    }

    WorkerHandle { task, receiver: rx }
}

/// Simplify a track in the background.
pub fn simplify_in_background(
    track: Track,
    strategy: SimplificationStrategy,
    sensitivity: f64,
    config: NavConfig,
) -> WorkerHandle<Result<Route>> {
    let task = format!("simplify {}", track.name);
    spawn(task, move || simplify_track(&track, strategy, sensitivity, &config))
}

/// Build a map catalog from indexer output in the background.
pub fn build_catalog_in_background(
    descriptors: Vec<MapDescriptor>,
    hash: u64,
) -> WorkerHandle<MapCatalog> {
    spawn("catalog", move || MapCatalog::new(descriptors, hash))
}

/// Move the viewport in the background; map activation may be slow.
pub fn locate_in_background(
    viewport: Arc<ViewportController>,
    latitude: f64,
    longitude: f64,
    find_best: bool,
) -> WorkerHandle<Result<bool>> {
    spawn("locate", move || viewport.set_location(latitude, longitude, find_best))
}
