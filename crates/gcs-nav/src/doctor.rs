use anyhow::Result;
use crate::autopilot::Thresholds;

pub fn check_gnss_source(source: &str, baud: u32, fix_timeout_s: u64) -> Result<()> {
    anyhow::ensure!(
        matches!(source, "nmea-serial" | "nmea-file" | "nmea-tcp"),
        "gnss.source must be nmea-serial, nmea-file or nmea-tcp (got {})", source
    );
    anyhow::ensure!(baud >= 4800, "gnss.baud too low");
    anyhow::ensure!(fix_timeout_s <= 60, "gnss.fix_timeout_s should be 0..60 (0 disables)");
    Ok(())
}

pub fn check_autopilot(thresholds: &Thresholds, tick_ms: u64) -> Result<()> {
    let t = thresholds;
    anyhow::ensure!(
        t.location_epsilon_km > 0.0 && t.location_epsilon_km < 0.1,
        "autopilot.location_epsilon_km out of range"
    );
    anyhow::ensure!(
        t.heading_epsilon_deg > 0.0 && t.heading_epsilon_deg < 90.0,
        "autopilot.heading_epsilon_deg out of range"
    );
    anyhow::ensure!((20..=5000).contains(&tick_ms), "autopilot.tick_ms should be 20..5000");
    Ok(())
}

pub fn check_waypoint_capacity(max_waypoints: usize) -> Result<()> {
    anyhow::ensure!((1..=256).contains(&max_waypoints), "operator.max_waypoints should be 1..256");
    Ok(())
}
