use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;

use gcs_proto::GpsPoint;

/// Point-in-time copy of the tracker contents.
#[derive(Debug, Clone, Copy)]
pub struct FixSnapshot {
    pub current: GpsPoint,
    pub previous: GpsPoint,
    /// Number of fixes recorded so far.
    pub generation: u64,
    pub updated_at: Option<OffsetDateTime>,
}

impl Default for FixSnapshot {
    fn default() -> Self {
        Self {
            current: GpsPoint::NONE,
            previous: GpsPoint::NONE,
            generation: 0,
            updated_at: None,
        }
    }
}

impl FixSnapshot {
    pub fn has_fix(&self) -> bool {
        self.current.is_valid()
    }
}

/// Current and previous GPS fix behind one lock.
///
/// Writers shift `current` into `previous` and store the new fix in the same
/// critical section, so readers never see a torn pair. Readers only ever get
/// a copy; the lock is not held while they compute.
#[derive(Debug, Clone, Default)]
pub struct FixTracker {
    inner: Arc<Mutex<FixSnapshot>>,
}

impl FixTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fix. Invalid points are refused and leave the state untouched.
    pub fn record(&self, fix: GpsPoint, at: OffsetDateTime) -> bool {
        if !fix.is_valid() {
            return false;
        }
        let mut st = self.lock();
        st.previous = st.current;
        st.current = fix;
        st.generation = st.generation.wrapping_add(1);
        st.updated_at = Some(at);
        true
    }

    pub fn snapshot(&self) -> FixSnapshot {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, FixSnapshot> {
        // plain Copy data, safe to keep serving after a poisoning panic
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
