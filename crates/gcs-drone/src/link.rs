use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::at::{AtCodec, AtCommand};
use crate::retry::SendRetry;

/// Resolves `host:port` and returns a UDP socket connected to it.
pub async fn connect_udp(host: &str, port: u16) -> Result<(UdpSocket, SocketAddr)> {
    let peer = tokio::net::lookup_host((host, port)).await
        .with_context(|| format!("resolve {}:{}", host, port))?
        .next()
        .with_context(|| format!("no address for {}:{}", host, port))?;
    let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local).await.context("bind udp socket")?;
    socket.connect(peer).await.with_context(|| format!("connect udp {}", peer))?;
    Ok((socket, peer))
}

/// Datagram channel to the vehicle's AT command port.
///
/// Owns the per-session sequence counter. The first frame carries 1 and every
/// frame that leaves increments it once, wrapping at `u32::MAX`.
pub struct DroneLink {
    socket: UdpSocket,
    peer: SocketAddr,
    codec: AtCodec,
    retry: SendRetry,
    seq: u32,
    last_sent: Option<Instant>,
    frames_sent: u64,
}

impl DroneLink {
    pub async fn open(host: &str, port: u16, codec: AtCodec, retry: SendRetry) -> Result<Self> {
        let (socket, peer) = connect_udp(host, port).await.context("open vehicle command channel")?;
        info!("vehicle: command channel to {}", peer);
        Ok(Self::from_socket(socket, peer, codec, retry))
    }

    pub fn from_socket(socket: UdpSocket, peer: SocketAddr, codec: AtCodec, retry: SendRetry) -> Self {
        Self { socket, peer, codec, retry, seq: 1, last_sent: None, frames_sent: 0 }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Sequence number the next frame will carry.
    pub fn next_seq(&self) -> u32 {
        self.seq
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn since_last_send(&self) -> Option<Duration> {
        self.last_sent.map(|t| t.elapsed())
    }

    /// Encodes and transmits one frame. Transient failures are retried per the
    /// link's [`SendRetry`]; an error returned from here means the link is gone.
    pub async fn send(&mut self, cmd: AtCommand) -> Result<u32> {
        let seq = self.seq;
        let frame = self.codec.encode(cmd, seq);
        let mut attempt = 0;
        loop {
            match self.socket.send(frame.as_bytes()).await {
                Ok(_) => break,
                Err(e) => {
                    attempt += 1;
                    let Some(delay) = self.retry.delay(attempt) else {
                        return Err(e).with_context(|| {
                            format!("send {:?} to vehicle {} after {} attempts", frame.trim_end(), self.peer, attempt)
                        });
                    };
                    warn!("vehicle: send failed (attempt {}): {}; retrying in {:?}", attempt, e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
        debug!("vehicle: {}", frame.trim_end());
        self.seq = seq.wrapping_add(1);
        self.last_sent = Some(Instant::now());
        self.frames_sent += 1;
        Ok(seq)
    }

    /// Demo-mode navdata, control ack, flat trim.
    pub async fn navdata_init(&mut self) -> Result<()> {
        self.send(AtCommand::NavdataDemo).await?;
        self.send(AtCommand::CtrlAck).await?;
        self.send(AtCommand::FlatTrim).await?;
        info!("vehicle: navdata init sent");
        Ok(())
    }

    pub async fn keepalive(&mut self) -> Result<u32> {
        self.send(AtCommand::Watchdog).await
    }
}
