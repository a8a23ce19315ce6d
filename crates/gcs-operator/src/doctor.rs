use anyhow::Result;
use std::net::SocketAddr;

use crate::OperatorConfig;

pub fn check_operator(o: &OperatorConfig) -> Result<()> {
    let listen: SocketAddr = o.listen.parse()
        .map_err(|e| anyhow::anyhow!("operator.listen {:?}: {}", o.listen, e))?;
    if o.uplink_enable {
        anyhow::ensure!(!o.display.is_empty(), "operator.display missing");
        anyhow::ensure!(
            o.display.rsplit_once(':').map_or(false, |(_, p)| p.parse::<u16>().is_ok()),
            "operator.display must be host:port, got {:?}", o.display
        );
        anyhow::ensure!(
            (100..=60_000).contains(&o.uplink_interval_ms),
            "operator.uplink_interval_ms should be 100..60000"
        );
        if let Ok(display) = o.display.parse::<SocketAddr>() {
            anyhow::ensure!(
                display.port() != listen.port() || display.ip() != listen.ip(),
                "operator.display points back at the command listener"
            );
        }
    }
    anyhow::ensure!(o.connect_retries <= 100, "operator.connect_retries too high");
    gcs_nav::doctor::check_waypoint_capacity(o.max_waypoints)?;
    Ok(())
}
