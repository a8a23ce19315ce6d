use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use gcs_nav::FixTracker;
use gcs_proto::{FixReport, GpsPoint};

/// Fix reports streamed to the operator display, one line per fix.
#[derive(Debug)]
pub struct Uplink {
    stream: TcpStream,
    peer: SocketAddr,
    seq: u64,
    sent_bytes: u64,
}

impl Uplink {
    /// Connects to the display, retrying with a linear backoff. Giving up after
    /// `retries` extra attempts is fatal.
    pub async fn connect(addr: &str, retries: u32, backoff: Duration) -> Result<Self> {
        let mut attempt = 0u32;
        let stream = loop {
            match TcpStream::connect(addr).await {
                Ok(s) => break s,
                Err(e) if attempt < retries => {
                    attempt += 1;
                    let wait = backoff * attempt;
                    warn!("uplink: connect {} failed ({}), retry {}/{} in {:?}", addr, e, attempt, retries, wait);
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("connect operator display {} after {} attempts", addr, attempt + 1));
                }
            }
        };
        stream.set_nodelay(true).ok();
        let peer = stream.peer_addr()?;
        info!("uplink: streaming fixes to {}", peer);
        Ok(Self { stream, peer, seq: 0, sent_bytes: 0 })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Lines written so far; also the sequence number of the next report.
    pub fn sent(&self) -> u64 {
        self.seq
    }

    pub async fn send_fix(&mut self, point: GpsPoint) -> Result<FixReport> {
        let report = FixReport::new(point, self.seq);
        let line = report.to_line();
        self.stream
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("send fix report to {}", self.peer))?;
        self.seq += 1;
        self.sent_bytes += line.len() as u64;
        debug!("uplink: {}", report);
        Ok(report)
    }

    /// Sends the current fix every `interval` until shutdown. Ticks without a
    /// valid fix send nothing.
    pub async fn run(mut self, fixes: FixTracker, interval: Duration, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            let snap = fixes.snapshot();
            if !snap.has_fix() {
                continue;
            }
            self.send_fix(snap.current).await?;
        }
        info!("uplink: stopped after {} reports ({} bytes)", self.seq, self.sent_bytes);
        Ok(())
    }
}
