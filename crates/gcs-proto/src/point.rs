use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in degrees.
///
/// `NaN` in either coordinate means "no fix yet"; such points must be
/// filtered with [`GpsPoint::is_valid`] before they reach any decision logic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GpsPoint {
    pub const NONE: GpsPoint = GpsPoint { lat: f64::NAN, lon: f64::NAN };

    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and inside the geodetic range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat.abs() <= 90.0
            && self.lon.abs() <= 180.0
    }
}

impl Default for GpsPoint {
    fn default() -> Self {
        Self::NONE
    }
}
