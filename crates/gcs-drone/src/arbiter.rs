//! Exclusive control of the vehicle command channel.
//!
//! The authority value and the [`DroneLink`] live behind the same async lock,
//! so checking who holds authority and putting the frame on the wire form one
//! critical section. A session that flips to manual therefore can never race
//! an autopilot frame that was decided under autonomous authority.

use anyhow::Result;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use gcs_proto::{Authority, Maneuver};

use crate::at::AtCommand;
use crate::link::DroneLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issued {
    Sent { seq: u32 },
    /// The caller does not hold authority; nothing was sent.
    Refused { holder: Authority },
}

/// Counts of authority transitions since start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Handovers {
    pub to_manual: u64,
    pub to_autonomous: u64,
}

struct Gate {
    authority: Authority,
    link: DroneLink,
    handovers: Handovers,
}

pub struct Arbiter {
    gate: Mutex<Gate>,
}

impl Arbiter {
    pub fn new(link: DroneLink) -> Self {
        Self {
            gate: Mutex::new(Gate { authority: Authority::Autonomous, link, handovers: Handovers::default() }),
        }
    }

    pub async fn authority(&self) -> Authority {
        self.gate.lock().await.authority
    }

    pub async fn handovers(&self) -> Handovers {
        self.gate.lock().await.handovers
    }

    pub async fn next_seq(&self) -> u32 {
        self.gate.lock().await.link.next_seq()
    }

    /// Sends `maneuver` if `caller` currently holds authority.
    pub async fn issue(&self, caller: Authority, maneuver: Maneuver) -> Result<Issued> {
        let mut g = self.gate.lock().await;
        if g.authority != caller {
            return Ok(Issued::Refused { holder: g.authority });
        }
        let seq = g.link.send(AtCommand::Maneuver(maneuver)).await?;
        Ok(Issued::Sent { seq })
    }

    /// Hands the channel to the manual operator. Returns `false` if it was
    /// already manual.
    pub async fn claim_manual(&self) -> bool {
        let mut g = self.gate.lock().await;
        if g.authority == Authority::Manual {
            return false;
        }
        g.authority = Authority::Manual;
        g.handovers.to_manual += 1;
        info!("arbiter: authority -> manual");
        true
    }

    /// Returns the channel to the autopilot. Returns `false` if it was
    /// already autonomous.
    pub async fn release_manual(&self) -> bool {
        let mut g = self.gate.lock().await;
        if g.authority == Authority::Autonomous {
            return false;
        }
        g.authority = Authority::Autonomous;
        g.handovers.to_autonomous += 1;
        info!("arbiter: authority -> autonomous");
        true
    }

    /// Sends the watchdog frame when nothing has gone out for `interval`.
    /// Independent of authority: the vehicle fails safe into hover otherwise.
    pub async fn keepalive_if_due(&self, interval: Duration) -> Result<Option<u32>> {
        let mut g = self.gate.lock().await;
        let due = g.link.since_last_send().map_or(true, |age| age >= interval);
        if !due {
            return Ok(None);
        }
        Ok(Some(g.link.keepalive().await?))
    }

    pub async fn navdata_init(&self) -> Result<()> {
        self.gate.lock().await.link.navdata_init().await
    }
}
