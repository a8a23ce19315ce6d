use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::arbiter::Arbiter;
use crate::link::connect_udp;
use crate::navdata::{self, Telemetry};
use crate::state::TelemetryMonitor;

/// Wake frame; the vehicle answers each one with a single navdata datagram.
pub const TICKLE: [u8; 2] = [0x01, 0x00];

/// Polls the vehicle's navdata port.
pub struct NavdataLink {
    socket: UdpSocket,
    peer: SocketAddr,
    arbiter: Arc<Arbiter>,
    watchdog: Duration,
    recv_timeout: Duration,
    monitor: TelemetryMonitor,
    buf: Vec<u8>,
}

impl NavdataLink {
    pub async fn open(
        host: &str,
        port: u16,
        arbiter: Arc<Arbiter>,
        watchdog: Duration,
        recv_timeout: Duration,
        monitor: TelemetryMonitor,
    ) -> Result<Self> {
        let (socket, peer) = connect_udp(host, port).await.context("open vehicle navdata channel")?;
        info!("vehicle: navdata channel to {}", peer);
        Ok(Self { socket, peer, arbiter, watchdog, recv_timeout, monitor, buf: vec![0u8; 4096] })
    }

    pub fn monitor(&self) -> &TelemetryMonitor {
        &self.monitor
    }

    /// Tickles the vehicle, keeps the command watchdog fed, then waits for one
    /// frame. Timeouts and undecodable frames are `Ok(None)`; only a failing
    /// transport is an error.
    pub async fn poll_once(&mut self) -> Result<Option<Telemetry>> {
        match self.socket.send(&TICKLE).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                warn!("navdata: vehicle {} refused tickle", self.peer);
            }
            Err(e) => return Err(e).context("send navdata tickle"),
        }
        self.arbiter.keepalive_if_due(self.watchdog).await?;

        let n = match tokio::time::timeout(self.recv_timeout, self.socket.recv(&mut self.buf)).await {
            Err(_) => {
                debug!("navdata: no frame within {:?}", self.recv_timeout);
                self.monitor.record_drop();
                return Ok(None);
            }
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                warn!("navdata: vehicle {} unreachable", self.peer);
                self.monitor.record_drop();
                return Ok(None);
            }
            Ok(Err(e)) => return Err(e).context("receive navdata"),
            Ok(Ok(n)) => n,
        };

        match navdata::decode(&self.buf[..n]) {
            Ok(t) => {
                if !self.monitor.is_ready() {
                    info!("navdata: telemetry ready (seq {}, battery {}%)", t.sequence, t.battery_pct);
                }
                self.monitor.record(t);
                Ok(Some(t))
            }
            Err(e) => {
                debug!("navdata: dropping {}-byte frame: {}", n, e);
                self.monitor.record_drop();
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::at::AtCodec;
    use crate::link::DroneLink;
    use crate::navdata::testing::FrameBuilder;
    use crate::navdata::StatusFlags;
    use crate::retry::SendRetry;

    async fn setup() -> (NavdataLink, UdpSocket, UdpSocket) {
        let cmd_port = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let nav_port = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let link = DroneLink::open("127.0.0.1", cmd_port.local_addr().unwrap().port(), AtCodec::default(), SendRetry::none())
            .await
            .unwrap();
        let nav = NavdataLink::open(
            "127.0.0.1",
            nav_port.local_addr().unwrap().port(),
            Arc::new(Arbiter::new(link)),
            Duration::from_secs(60),
            Duration::from_millis(200),
            TelemetryMonitor::new(),
        )
        .await
        .unwrap();
        (nav, cmd_port, nav_port)
    }

    #[tokio::test]
    async fn tickle_then_decode() {
        let (mut nav, cmd_port, nav_port) = setup().await;
        let vehicle = tokio::spawn(async move {
            let mut buf = [0u8; 16];
            let (n, from) = nav_port.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], &TICKLE);
            let frame = FrameBuilder::new(StatusFlags::FLYING, 9).demo(1.0, 2.0, 3.0, 80, 500).finish();
            nav_port.send_to(&frame, from).await.unwrap();
        });

        let t = nav.poll_once().await.unwrap().unwrap();
        vehicle.await.unwrap();
        assert_eq!(t.sequence, 9);
        assert!(nav.monitor().is_ready());

        // watchdog went out on the command port alongside the tickle
        let mut buf = [0u8; 64];
        let n = cmd_port.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"AT*COMWDG=1\r");
    }

    #[tokio::test]
    async fn garbage_and_silence_are_not_fatal() {
        let (mut nav, _cmd_port, nav_port) = setup().await;
        let vehicle = tokio::spawn(async move {
            let mut buf = [0u8; 16];
            let (_, from) = nav_port.recv_from(&mut buf).await.unwrap();
            nav_port.send_to(b"not navdata at all", from).await.unwrap();
            // second tickle goes unanswered
            nav_port.recv_from(&mut buf).await.unwrap();
        });

        assert!(nav.poll_once().await.unwrap().is_none());
        assert!(nav.poll_once().await.unwrap().is_none());
        vehicle.await.unwrap();
        let st = nav.monitor().snapshot();
        assert!(!st.ready);
        assert_eq!(st.dropped, 2);
    }
}
