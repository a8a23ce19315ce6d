use serde::{Deserialize, Serialize};
use std::fmt;

use crate::point::GpsPoint;

/// A fix report sent to the operator display, one per uplink line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixReport {
    pub lat: f64,
    pub lon: f64,
    pub seq: u64,
}

impl FixReport {
    pub fn new(point: GpsPoint, seq: u64) -> Self {
        Self { lat: point.lat, lon: point.lon, seq }
    }

    /// Wire form: `"<lat> <lon> <seq>\n"`.
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for FixReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} {:.6} {}", self.lat, self.lon, self.seq)
    }
}
