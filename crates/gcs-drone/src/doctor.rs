use anyhow::Result;

use crate::{TelemetryConfig, VehicleConfig};

pub fn check_vehicle(v: &VehicleConfig) -> Result<()> {
    anyhow::ensure!(!v.host.is_empty(), "vehicle.host missing");
    anyhow::ensure!(v.command_port != v.navdata_port, "vehicle command and navdata ports must differ");
    // the vehicle's own com watchdog trips after 2 s of silence
    anyhow::ensure!(v.watchdog_ms >= 20 && v.watchdog_ms < 2000, "vehicle.watchdog_ms should be 20..2000");
    anyhow::ensure!(v.send_retries <= 10, "vehicle.send_retries too high");
    for (name, s) in [("move_speed", v.move_speed), ("climb_speed", v.climb_speed), ("rotate_speed", v.rotate_speed)] {
        anyhow::ensure!(s > 0.0 && s <= 1.0, "vehicle.{} must be in (0, 1]", name);
    }
    Ok(())
}

pub fn check_telemetry(t: &TelemetryConfig, v: &VehicleConfig) -> Result<()> {
    if t.enable {
        anyhow::ensure!(t.recv_timeout_ms >= 10, "telemetry.recv_timeout_ms too small");
        anyhow::ensure!(
            t.recv_timeout_ms < 2000 + v.watchdog_ms,
            "telemetry.recv_timeout_ms would starve the command watchdog"
        );
    }
    Ok(())
}
