use std::sync::{Arc, Mutex, MutexGuard};

use gcs_proto::GpsPoint;

pub const DEFAULT_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("waypoint list of {len} exceeds capacity {capacity}")]
pub struct CapacityExceeded {
    pub len: usize,
    pub capacity: usize,
}

#[derive(Debug, Default)]
struct Route {
    points: Vec<GpsPoint>,
    cursor: Option<usize>,
}

/// Ordered, bounded list of operator waypoints with a cursor on the active one.
#[derive(Debug, Clone)]
pub struct WaypointStore {
    inner: Arc<Mutex<Route>>,
    capacity: usize,
}

impl Default for WaypointStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl WaypointStore {
    pub fn new(capacity: usize) -> Self {
        Self { inner: Arc::new(Mutex::new(Route::default())), capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replaces the whole list and points the cursor at its first entry.
    /// An empty list leaves no active waypoint.
    pub fn replace(&self, points: Vec<GpsPoint>) -> Result<(), CapacityExceeded> {
        if points.len() > self.capacity {
            return Err(CapacityExceeded { len: points.len(), capacity: self.capacity });
        }
        let mut r = self.lock();
        r.cursor = if points.is_empty() { None } else { Some(0) };
        r.points = points;
        Ok(())
    }

    pub fn active(&self) -> Option<GpsPoint> {
        let r = self.lock();
        r.cursor.and_then(|i| r.points.get(i).copied())
    }

    /// Index of the active waypoint together with whether another one follows it.
    pub fn active_with_next(&self) -> Option<(usize, GpsPoint, bool)> {
        let r = self.lock();
        let i = r.cursor?;
        let p = *r.points.get(i)?;
        Some((i, p, i + 1 < r.points.len()))
    }

    pub fn cursor(&self) -> Option<usize> {
        self.lock().cursor
    }

    /// Moves to the next waypoint, only if `from` is still the active index.
    /// Past the last entry there is no active waypoint.
    pub fn advance(&self, from: usize) -> Option<usize> {
        let mut r = self.lock();
        if r.cursor != Some(from) {
            return r.cursor;
        }
        let next = from + 1;
        r.cursor = (next < r.points.len()).then_some(next);
        r.cursor
    }

    pub fn points(&self) -> Vec<GpsPoint> {
        self.lock().points.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Route> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
