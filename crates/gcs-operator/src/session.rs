//! Manual control sessions on the operator command channel.
//!
//! One session is served at a time: the accept loop spawns a task for the
//! connection and joins it before accepting the next one, so further
//! operators wait in the listen backlog.

use anyhow::{Context, Result};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use gcs_drone::{Arbiter, Issued};
use gcs_nav::WaypointStore;
use gcs_proto::{Authority, OperatorMessage, ParseError};

/// Longest line accepted before the buffer is discarded.
const MAX_LINE: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub lines: u64,
    pub forwarded: u64,
    pub ignored: u64,
    pub waypoint_lists: u64,
    pub claimed_manual: bool,
}

pub struct SessionManager {
    listener: TcpListener,
    arbiter: Arc<Arbiter>,
    waypoints: WaypointStore,
}

impl SessionManager {
    pub async fn bind(addr: &str, arbiter: Arc<Arbiter>, waypoints: WaypointStore) -> Result<Self> {
        let listener = TcpListener::bind(addr).await
            .with_context(|| format!("bind operator command listener {}", addr))?;
        info!("operator: listening for commands on {}", listener.local_addr()?);
        Ok(Self { listener, arbiter, waypoints })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves sessions until shutdown. Returns an error only when a session hit
    /// a fatal command-channel failure.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            let (stream, peer) = tokio::select! {
                r = self.listener.accept() => match r {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("operator: accept failed: {}", e);
                        continue;
                    }
                },
                _ = shutdown.changed() => return Ok(()),
            };

            info!("operator: session from {}", peer);
            let session = Session::new(peer, self.arbiter.clone(), self.waypoints.clone());
            let joined = tokio::spawn(session.run(stream, shutdown.clone())).await;

            // Covers a panicked session too; a no-op when the session already released.
            self.arbiter.release_manual().await;

            match joined {
                Ok(Ok(summary)) => info!(
                    "operator: session {} closed ({} lines, {} forwarded, {} ignored)",
                    peer, summary.lines, summary.forwarded, summary.ignored
                ),
                Ok(Err(e)) => {
                    error!("operator: session {} lost the vehicle: {:#}", peer, e);
                    return Err(e);
                }
                Err(e) => warn!("operator: session {} task failed: {}", peer, e),
            }

            if *shutdown.borrow() {
                return Ok(());
            }
        }
    }
}

struct Session {
    peer: SocketAddr,
    arbiter: Arc<Arbiter>,
    waypoints: WaypointStore,
    summary: SessionSummary,
}

impl Session {
    fn new(peer: SocketAddr, arbiter: Arc<Arbiter>, waypoints: WaypointStore) -> Self {
        Self { peer, arbiter, waypoints, summary: SessionSummary::default() }
    }

    async fn run(mut self, mut stream: TcpStream, mut shutdown: watch::Receiver<bool>) -> Result<SessionSummary> {
        let mut buf = BytesMut::with_capacity(1024);
        let outcome = 'session: loop {
            let read = tokio::select! {
                r = stream.read_buf(&mut buf) => r,
                _ = shutdown.changed() => break 'session Ok(()),
            };
            match read {
                Ok(0) => {
                    info!("operator: {} disconnected", self.peer);
                    break 'session Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("operator: read from {} failed: {}", self.peer, e);
                    break 'session Ok(());
                }
            }

            while let Some(line) = next_line(&mut buf) {
                if let Err(e) = self.handle_line(&line).await {
                    break 'session Err(e);
                }
            }
            if buf.len() > MAX_LINE {
                warn!("operator: discarding {} bytes without a line break from {}", buf.len(), self.peer);
                buf.clear();
            }
        };

        if self.summary.claimed_manual {
            self.arbiter.release_manual().await;
        }
        outcome.map(|_| self.summary)
    }

    async fn handle_line(&mut self, line: &str) -> Result<()> {
        let msg = match line.parse::<OperatorMessage>() {
            Ok(msg) => msg,
            Err(ParseError::Empty) => return Ok(()),
            Err(e) => {
                warn!("operator: ignoring {:?}: {}", line, e);
                self.summary.ignored += 1;
                return Ok(());
            }
        };
        self.summary.lines += 1;

        match msg {
            OperatorMessage::Manual => {
                if self.summary.claimed_manual {
                    debug!("operator: {} already holds manual control", self.peer);
                } else if self.arbiter.claim_manual().await {
                    self.summary.claimed_manual = true;
                    info!("operator: {} took manual control", self.peer);
                } else {
                    warn!("operator: manual control already held elsewhere");
                }
            }
            OperatorMessage::Command(maneuver) => {
                if !self.summary.claimed_manual {
                    warn!("operator: ignoring `{}`: send `manual` first", maneuver);
                    self.summary.ignored += 1;
                    return Ok(());
                }
                match self.arbiter.issue(Authority::Manual, maneuver).await? {
                    Issued::Sent { seq } => {
                        debug!("operator: {} -> seq {}", maneuver, seq);
                        self.summary.forwarded += 1;
                    }
                    Issued::Refused { holder } => {
                        warn!("operator: `{}` refused, authority is {:?}", maneuver, holder);
                        self.summary.ignored += 1;
                    }
                }
            }
            OperatorMessage::Waypoints(points) => {
                let n = points.len();
                match self.waypoints.replace(points) {
                    Ok(()) => {
                        info!("operator: new route with {} waypoints", n);
                        self.summary.waypoint_lists += 1;
                    }
                    Err(e) => {
                        warn!("operator: route rejected: {}", e);
                        self.summary.ignored += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Pops the next complete line. Lines end at `\n`, `\r` or NUL so clients that
/// pad fixed-size buffers with zeros work as well.
fn next_line(buf: &mut BytesMut) -> Option<String> {
    let end = buf.iter().position(|b| matches!(b, b'\n' | b'\r' | 0))?;
    let line = buf.split_to(end);
    buf.advance(1);
    Some(String::from_utf8_lossy(&line).into_owned())
}
