use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::navdata::Telemetry;

#[derive(Debug, Clone, Default)]
pub struct TelemetryStatus {
    pub latest: Option<Telemetry>,
    /// Set on the first decoded frame and never cleared.
    pub ready: bool,
    pub frames: u64,
    pub dropped: u64,
    pub last_frame: Option<Instant>,
}

impl TelemetryStatus {
    pub fn frame_age(&self) -> Option<Duration> {
        self.last_frame.map(|t| t.elapsed())
    }

    /// Whether the vehicle reports itself in flight; `None` before telemetry.
    pub fn airborne(&self) -> Option<bool> {
        self.latest.map(|t| t.status.flying())
    }
}

/// Shared handle on the latest telemetry, written by the navdata poller.
#[derive(Debug, Clone, Default)]
pub struct TelemetryMonitor {
    inner: Arc<Mutex<TelemetryStatus>>,
}

impl TelemetryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, frame: Telemetry) {
        let mut st = self.lock();
        st.latest = Some(frame);
        st.ready = true;
        st.frames += 1;
        st.last_frame = Some(Instant::now());
    }

    pub fn record_drop(&self) {
        self.lock().dropped += 1;
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn snapshot(&self) -> TelemetryStatus {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, TelemetryStatus> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navdata::{StatusFlags, Telemetry};

    fn frame(status: u32) -> Telemetry {
        Telemetry {
            status: StatusFlags(status),
            sequence: 1,
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            battery_pct: 50,
            altitude_m: 0.0,
        }
    }

    #[test]
    fn ready_latches() {
        let m = TelemetryMonitor::new();
        assert!(!m.is_ready());
        assert_eq!(m.snapshot().airborne(), None);
        m.record(frame(StatusFlags::FLYING));
        m.record_drop();
        let s = m.snapshot();
        assert!(s.ready);
        assert_eq!(s.frames, 1);
        assert_eq!(s.dropped, 1);
        assert_eq!(s.airborne(), Some(true));
        m.record(frame(0));
        assert!(m.is_ready());
        assert_eq!(m.snapshot().airborne(), Some(false));
    }
}
