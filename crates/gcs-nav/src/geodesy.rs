//! Great-circle helpers on a spherical Earth.
//!
//! Formulas follow the usual haversine / initial-bearing forms. All
//! functions are total: `NaN` inputs propagate to `NaN` outputs and callers
//! are expected to check [`GpsPoint::is_valid`] first.

use gcs_proto::GpsPoint;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometers.
pub fn distance(p1: GpsPoint, p2: GpsPoint) -> f64 {
    let dlat = (p2.lat - p1.lat).to_radians();
    let dlon = (p2.lon - p1.lon).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + p1.lat.to_radians().cos() * p2.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Initial bearing from `p1` towards `p2`, degrees in `[0, 360)`.
/// 0 is north, 90 is east. Coincident points yield 0.
pub fn bearing(p1: GpsPoint, p2: GpsPoint) -> f64 {
    if p1 == p2 {
        return 0.0;
    }
    let dlon = (p2.lon - p1.lon).to_radians();
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();

    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let y = dlon.sin() * lat2.cos();

    let b = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative angles
    if b >= 360.0 { 0.0 } else { b }
}

/// Direction of travel estimated from the displacement `prev -> curr`.
///
/// This is an approximation until a real orientation sensor is wired in:
/// it is only meaningful while the vehicle is actually moving.
pub fn heading(curr: GpsPoint, prev: GpsPoint) -> f64 {
    bearing(prev, curr)
}

/// Map any angle in degrees into `(-180, 180]`.
pub fn normalize_signed_180(deg: f64) -> f64 {
    let r = deg.rem_euclid(360.0);
    if r > 180.0 { r - 360.0 } else { r }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAWRENCE: GpsPoint = GpsPoint::new(38.9500, -95.2500);
    const DEST: GpsPoint = GpsPoint::new(38.9544, -95.2528);

    #[test]
    fn distance_to_self_is_zero() {
        assert_eq!(distance(LAWRENCE, LAWRENCE), 0.0);
        assert_eq!(bearing(LAWRENCE, LAWRENCE), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = distance(LAWRENCE, DEST);
        let b = distance(DEST, LAWRENCE);
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn scenario_distance() {
        let d = distance(LAWRENCE, DEST);
        assert!((d - 0.56).abs() < 0.02, "got {d}");
        assert!(d > 0.003);
    }

    #[test]
    fn cardinal_bearings() {
        let origin = GpsPoint::new(0.0, 0.0);
        assert!((bearing(origin, GpsPoint::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((bearing(origin, GpsPoint::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing(origin, GpsPoint::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing(origin, GpsPoint::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn reverse_bearing_is_roughly_opposite() {
        let fwd = bearing(LAWRENCE, DEST);
        let back = bearing(DEST, LAWRENCE);
        let diff = normalize_signed_180(back - fwd).abs();
        assert!((diff - 180.0).abs() < 0.1, "diff {diff}");
    }

    #[test]
    fn heading_is_bearing_from_previous_fix() {
        assert_eq!(heading(DEST, LAWRENCE), bearing(LAWRENCE, DEST));
    }

    #[test]
    fn nan_propagates() {
        assert!(distance(GpsPoint::NONE, LAWRENCE).is_nan());
        assert!(bearing(GpsPoint::NONE, LAWRENCE).is_nan());
    }

    #[test]
    fn normalize_range_and_period() {
        for i in -2000..2000 {
            let d = i as f64 * 0.75;
            let n = normalize_signed_180(d);
            assert!(n > -180.0 && n <= 180.0, "{d} -> {n}");
            assert!((normalize_signed_180(d + 360.0) - n).abs() < 1e-9);
        }
        assert_eq!(normalize_signed_180(180.0), 180.0);
        assert_eq!(normalize_signed_180(-180.0), 180.0);
        assert_eq!(normalize_signed_180(270.0), -90.0);
    }
}
