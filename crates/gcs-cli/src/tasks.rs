//! Long-running tasks of `groundstation run` and the supervisor that owns them.

use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use gcs_drone::{Arbiter, Issued, NavdataLink, TelemetryMonitor};
use gcs_nav::gnss::GnssSource;
use gcs_nav::{Autopilot, FixTracker, PilotState, Target, TickInput, WaypointStore};
use gcs_proto::Authority;

/// Pause after a poll that produced nothing, so a refusing vehicle is not hammered.
const POLL_BACKOFF: Duration = Duration::from_millis(50);

/// Runs every task until one fails or shutdown is requested. The first fatal
/// error is returned once all tasks have stopped.
pub struct Supervisor {
    tasks: JoinSet<(&'static str, Result<()>)>,
    shutdown: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { tasks: JoinSet::new(), shutdown }
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        debug!("run: starting {} task", name);
        self.tasks.spawn(async move { (name, task.await) });
    }

    pub async fn wait(mut self) -> Result<()> {
        let mut failure: Option<anyhow::Error> = None;
        let mut interrupted = false;
        loop {
            tokio::select! {
                joined = self.tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((name, Ok(())))) => debug!("run: {} task stopped", name),
                    Some(Ok((name, Err(e)))) => {
                        error!("run: {} task failed: {:#}", name, e);
                        failure.get_or_insert(e.context(format!("{} task", name)));
                        self.shutdown.send_replace(true);
                    }
                    Some(Err(e)) => {
                        error!("run: task aborted: {}", e);
                        failure.get_or_insert(anyhow!("task aborted: {}", e));
                        self.shutdown.send_replace(true);
                    }
                },
                r = tokio::signal::ctrl_c(), if !interrupted => {
                    interrupted = true;
                    if let Err(e) = r {
                        warn!("run: cannot listen for ctrl-c: {}", e);
                    } else {
                        info!("run: interrupted, shutting down");
                    }
                    self.shutdown.send_replace(true);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Feeds the fix tracker. With a `fix_timeout`, a source that delivers no
/// position sentence for that long is fatal. Sentences without a lock are
/// not: they are dropped by the tracker and the autopilot idles.
pub async fn gps_ingest(
    mut source: GnssSource,
    fixes: FixTracker,
    fix_timeout: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut last_sentence = Instant::now();
    let mut lost = false;
    loop {
        let deadline = fix_timeout.map(|t| (last_sentence + t, t));
        let next = async {
            match deadline {
                Some((at, t)) => tokio::time::timeout_at(at, source.next_fix())
                    .await
                    .map_err(|_| anyhow!("no GPS sentence for {:?}", t))?,
                None => source.next_fix().await,
            }
        };
        let fix = tokio::select! {
            r = next => r?,
            _ = shutdown.changed() => return Ok(()),
        };
        last_sentence = Instant::now();

        if fixes.record(fix.point, fix.ts) {
            if lost {
                info!("gnss: fix reacquired ({} sats)", fix.quality.sats);
                lost = false;
            }
            debug!("gnss: {:.6} {:.6} hdop {:.1}", fix.point.lat, fix.point.lon, fix.quality.hdop);
        } else if !lost {
            warn!("gnss: no lock, discarding fix (indicator {}, {} sats)", fix.quality.indicator, fix.quality.sats);
            lost = true;
        }
    }
}

pub async fn telemetry_poll(mut nav: NavdataLink, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let mut battery_warned = false;
    let mut emergency = false;
    loop {
        let polled = tokio::select! {
            r = nav.poll_once() => r?,
            _ = shutdown.changed() => break,
        };
        match polled {
            Some(t) => {
                if t.status.battery_low() && !battery_warned {
                    warn!("navdata: vehicle reports low battery ({}%)", t.battery_pct);
                    battery_warned = true;
                }
                if t.status.emergency() != emergency {
                    emergency = t.status.emergency();
                    if emergency {
                        warn!("navdata: vehicle entered emergency state");
                    } else {
                        info!("navdata: vehicle left emergency state");
                    }
                }
            }
            None => tokio::time::sleep(POLL_BACKOFF).await,
        }
    }
    let st = nav.monitor().snapshot();
    info!("navdata: stopped ({} frames, {} dropped)", st.frames, st.dropped);
    Ok(())
}

/// Keeps the vehicle's command watchdog from tripping while nobody else sends.
pub async fn watchdog(arbiter: Arc<Arbiter>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let mut ticker = tokio::time::interval(interval / 2);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return Ok(()),
        }
        if let Some(seq) = arbiter.keepalive_if_due(interval).await? {
            debug!("watchdog: keepalive seq {}", seq);
        }
    }
}

#[derive(Clone)]
pub struct PilotContext {
    pub arbiter: Arc<Arbiter>,
    pub fixes: FixTracker,
    pub waypoints: WaypointStore,
    pub telemetry: TelemetryMonitor,
    /// Hold off until the first navdata frame has been decoded.
    pub require_telemetry: bool,
}

/// One autopilot decision per tick. Decisions are sent under autonomous
/// authority and silently dropped while the operator holds the channel.
pub async fn autopilot(
    ctx: PilotContext,
    mut pilot: Autopilot,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_state = pilot.state();
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return Ok(()),
        }

        let telemetry = ctx.telemetry.snapshot();
        if ctx.require_telemetry && !telemetry.ready {
            debug!("autopilot: waiting for telemetry");
            continue;
        }

        let input = TickInput {
            authority: ctx.arbiter.authority().await,
            fix: ctx.fixes.snapshot(),
            target: ctx.waypoints.active_with_next().map(|(index, point, has_next)| Target { index, point, has_next }),
            airborne: telemetry.airborne(),
        };
        let decision = pilot.step(&input);
        if decision.state != last_state {
            info!("autopilot: {}", decision.message);
            last_state = decision.state;
        } else if decision.state != PilotState::Idle {
            debug!("autopilot: {}", decision.message);
        }

        let Some(maneuver) = decision.maneuver else { continue };
        match ctx.arbiter.issue(Authority::Autonomous, maneuver).await? {
            Issued::Sent { seq } => debug!("autopilot: {} -> seq {}", maneuver, seq),
            Issued::Refused { holder } => {
                debug!("autopilot: {} dropped, {:?} holds the channel", maneuver, holder);
                continue;
            }
        }

        if let Some(reached) = decision.reached {
            match ctx.waypoints.advance(reached) {
                Some(next) => info!("autopilot: waypoint {} reached, heading for {}", reached, next),
                None => info!("autopilot: waypoint {} reached, route complete", reached),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcs_drone::{AtCodec, DroneLink, SendRetry};
    use gcs_proto::GpsPoint;
    use time::OffsetDateTime;
    use tokio::net::UdpSocket;

    async fn context() -> (PilotContext, UdpSocket) {
        let vehicle = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = vehicle.local_addr().unwrap().port();
        let link = DroneLink::open("127.0.0.1", port, AtCodec::default(), SendRetry::none()).await.unwrap();
        let ctx = PilotContext {
            arbiter: Arc::new(Arbiter::new(link)),
            fixes: FixTracker::new(),
            waypoints: WaypointStore::default(),
            telemetry: TelemetryMonitor::new(),
            require_telemetry: false,
        };
        (ctx, vehicle)
    }

    async fn recv_frame(vehicle: &UdpSocket) -> String {
        let mut buf = [0u8; 128];
        let n = tokio::time::timeout(Duration::from_secs(2), vehicle.recv(&mut buf)).await.unwrap().unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn lands_on_final_waypoint_and_clears_route() {
        let (ctx, vehicle) = context().await;
        let here = GpsPoint::new(38.95, -95.25);
        ctx.fixes.record(here, OffsetDateTime::now_utc());
        ctx.waypoints.replace(vec![here]).unwrap();

        let mut sup = Supervisor::new();
        let rx = sup.shutdown_signal();
        sup.spawn("autopilot", autopilot(ctx.clone(), Autopilot::default(), Duration::from_millis(20), rx));

        assert_eq!(recv_frame(&vehicle).await, "AT*REF=1,290717696\r");
        for _ in 0..100 {
            if ctx.waypoints.cursor().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(ctx.waypoints.cursor(), None);

        sup.shutdown.send_replace(true);
        sup.wait().await.unwrap();
    }

    #[tokio::test]
    async fn stays_quiet_under_manual_authority() {
        let (ctx, vehicle) = context().await;
        let here = GpsPoint::new(38.95, -95.25);
        ctx.fixes.record(here, OffsetDateTime::now_utc());
        ctx.waypoints.replace(vec![here]).unwrap();
        assert!(ctx.arbiter.claim_manual().await);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(autopilot(ctx.clone(), Autopilot::default(), Duration::from_millis(20), rx));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut buf = [0u8; 64];
        assert!(vehicle.try_recv(&mut buf).is_err());
        assert_eq!(ctx.waypoints.cursor(), Some(0));

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn first_failure_is_reported() {
        let mut sup = Supervisor::new();
        let mut rx = sup.shutdown_signal();
        sup.spawn("doomed", async { Err(anyhow!("link gone")) });
        sup.spawn("bystander", async move {
            let _ = rx.changed().await;
            Ok(())
        });
        let err = sup.wait().await.unwrap_err();
        assert!(format!("{:#}", err).contains("doomed task: link gone"));
    }

    #[tokio::test]
    async fn receiver_without_lock_keeps_ingesting() {
        let dir = std::env::temp_dir().join(format!("gcs-nolock-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cold-start.nmea");
        std::fs::write(&path, "$GPGGA,000000,,,,,0,00,99.9,,M,,M,,\n").unwrap();
        let source = GnssSource::file(path.to_str().unwrap(), Duration::from_millis(10)).unwrap();

        let fixes = FixTracker::new();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(gps_ingest(source, fixes.clone(), Some(Duration::from_millis(300)), rx));

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(!task.is_finished());
        assert!(!fixes.snapshot().has_fix());

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn silent_source_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let feeder = tokio::spawn(async move {
            // connected but never speaks
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });
        let source = GnssSource::tcp(&addr).await.unwrap();

        let (_tx, rx) = watch::channel(false);
        let err = gps_ingest(source, FixTracker::new(), Some(Duration::from_millis(100)), rx)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("no GPS sentence"));
        feeder.abort();
    }
}
