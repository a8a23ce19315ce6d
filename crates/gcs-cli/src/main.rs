mod tasks;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use gcs_drone::{doctor as drone_doctor, Arbiter, AtCodec, DroneLink, NavdataLink, TelemetryConfig, TelemetryMonitor, VehicleConfig};
use gcs_nav::{doctor as nav_doctor, gnss, Autopilot, FixTracker, Thresholds, WaypointStore};
use gcs_operator::{doctor as operator_doctor, OperatorConfig, SessionManager, Uplink};
use gcs_proto::Maneuver;

use tasks::{PilotContext, Supervisor};

#[derive(Debug, Parser)]
#[command(name = "groundstation", version, about = "Quadrotor ground station: waypoint autopilot with manual override")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration.
    Doctor,
    Run,
    /// Initialise navdata and print one decoded telemetry frame.
    Probe,
    /// Print the command frame a maneuver encodes to.
    Encode {
        maneuver: String,
        #[arg(long, default_value_t = 1)]
        seq: u32,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    vehicle: VehicleConfig,
    gnss: GnssCfg,
    #[serde(default)]
    autopilot: AutopilotCfg,
    #[serde(default)]
    operator: OperatorConfig,
    #[serde(default)]
    telemetry: TelemetryConfig,
}

#[derive(Debug, serde::Deserialize)]
struct GnssCfg {
    source: String,
    nmea_device: Option<String>,
    #[serde(default = "default_baud")]
    baud: u32,
    nmea_file: Option<String>,
    nmea_addr: Option<String>,
    /// Replay pacing for `nmea-file`.
    #[serde(default = "default_replay_interval_ms")]
    replay_interval_ms: u64,
    /// 0 disables the check.
    #[serde(default = "default_fix_timeout_s")]
    fix_timeout_s: u64,
}

#[derive(Debug, serde::Deserialize)]
struct AutopilotCfg {
    #[serde(default = "default_tick_ms")]
    tick_ms: u64,
    #[serde(default = "default_location_epsilon_km")]
    location_epsilon_km: f64,
    #[serde(default = "default_heading_epsilon_deg")]
    heading_epsilon_deg: f64,
    #[serde(default)]
    require_telemetry: bool,
}

impl Default for AutopilotCfg {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            location_epsilon_km: default_location_epsilon_km(),
            heading_epsilon_deg: default_heading_epsilon_deg(),
            require_telemetry: false,
        }
    }
}

impl AutopilotCfg {
    fn thresholds(&self) -> Thresholds {
        Thresholds { location_epsilon_km: self.location_epsilon_km, heading_epsilon_deg: self.heading_epsilon_deg }
    }
}

fn default_baud() -> u32 { 38400 }
fn default_replay_interval_ms() -> u64 { 1000 }
fn default_fix_timeout_s() -> u64 { 5 }
fn default_tick_ms() -> u64 { 200 }
fn default_location_epsilon_km() -> f64 { gcs_nav::autopilot::LOCATION_EPSILON_KM }
fn default_heading_epsilon_deg() -> f64 { gcs_nav::autopilot::HEADING_EPSILON_DEG }

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run => run(&cfg).await?,
        Command::Probe => probe(&cfg).await?,
        Command::Encode { maneuver, seq } => encode(&cfg, &maneuver, seq)?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    drone_doctor::check_vehicle(&cfg.vehicle)?;
    drone_doctor::check_telemetry(&cfg.telemetry, &cfg.vehicle)?;

    let g = &cfg.gnss;
    nav_doctor::check_gnss_source(&g.source, g.baud, g.fix_timeout_s)?;
    match g.source.as_str() {
        "nmea-serial" => anyhow::ensure!(g.nmea_device.as_deref().is_some_and(|d| !d.is_empty()), "gnss.nmea_device missing"),
        "nmea-file" => {
            let path = g.nmea_file.as_deref().context("gnss.nmea_file missing")?;
            if !std::path::Path::new(path).is_file() {
                warn!("doctor: gnss.nmea_file {} does not exist yet", path);
            }
        }
        _ => anyhow::ensure!(g.nmea_addr.as_deref().is_some_and(|a| !a.is_empty()), "gnss.nmea_addr missing"),
    }

    nav_doctor::check_autopilot(&cfg.autopilot.thresholds(), cfg.autopilot.tick_ms)?;
    if cfg.autopilot.require_telemetry {
        anyhow::ensure!(cfg.telemetry.enable, "autopilot.require_telemetry needs telemetry.enable");
    }
    operator_doctor::check_operator(&cfg.operator)?;

    info!("doctor: OK");
    Ok(())
}

fn encode(cfg: &Config, maneuver: &str, seq: u32) -> Result<()> {
    let m: Maneuver = maneuver.parse()?;
    let frame = AtCodec::new(cfg.vehicle.speeds()).encode(m.into(), seq);
    println!("{}", frame.escape_debug());
    Ok(())
}

async fn open_gnss(g: &GnssCfg) -> Result<gnss::GnssSource> {
    match g.source.as_str() {
        "nmea-serial" => gnss::GnssSource::serial(g.nmea_device.as_deref().context("gnss.nmea_device missing")?, g.baud),
        "nmea-file" => gnss::GnssSource::file(
            g.nmea_file.as_deref().context("gnss.nmea_file missing")?,
            Duration::from_millis(g.replay_interval_ms),
        ),
        "nmea-tcp" => gnss::GnssSource::tcp(g.nmea_addr.as_deref().context("gnss.nmea_addr missing")?).await,
        other => anyhow::bail!("unknown gnss.source: {}", other),
    }
}

async fn open_vehicle(v: &VehicleConfig) -> Result<Arc<Arbiter>> {
    let link = DroneLink::open(&v.host, v.command_port, AtCodec::new(v.speeds()), v.retry()).await?;
    Ok(Arc::new(Arbiter::new(link)))
}

async fn probe(cfg: &Config) -> Result<()> {
    let arbiter = open_vehicle(&cfg.vehicle).await?;
    arbiter.navdata_init().await?;
    let mut nav = NavdataLink::open(
        &cfg.vehicle.host,
        cfg.vehicle.navdata_port,
        arbiter,
        cfg.vehicle.watchdog(),
        Duration::from_millis(cfg.telemetry.recv_timeout_ms),
        TelemetryMonitor::new(),
    )
    .await?;

    for _ in 0..5 {
        if let Some(t) = nav.poll_once().await? {
            println!("sequence={}", t.sequence);
            println!("status=0x{:08x} flying={} emergency={} battery_low={}",
                t.status.0, t.status.flying(), t.status.emergency(), t.status.battery_low());
            println!("battery={}%", t.battery_pct);
            println!("attitude pitch={:.2} roll={:.2} yaw={:.2}", t.pitch, t.roll, t.yaw);
            println!("altitude={:.2}m", t.altitude_m);
            return Ok(());
        }
    }
    let st = nav.monitor().snapshot();
    anyhow::bail!("no navdata from {} ({} polls dropped)", cfg.vehicle.host, st.dropped)
}

async fn run(cfg: &Config) -> Result<()> {
    doctor(cfg).context("configuration check")?;
    info!("run: starting");

    let fixes = FixTracker::new();
    let waypoints = WaypointStore::new(cfg.operator.max_waypoints);
    let monitor = TelemetryMonitor::new();
    let arbiter = open_vehicle(&cfg.vehicle).await?;
    let source = open_gnss(&cfg.gnss).await?;

    let mut sup = Supervisor::new();

    let fix_timeout = (cfg.gnss.fix_timeout_s > 0).then(|| Duration::from_secs(cfg.gnss.fix_timeout_s));
    sup.spawn("gps", tasks::gps_ingest(source, fixes.clone(), fix_timeout, sup.shutdown_signal()));

    if cfg.telemetry.enable {
        arbiter.navdata_init().await?;
        let nav = NavdataLink::open(
            &cfg.vehicle.host,
            cfg.vehicle.navdata_port,
            arbiter.clone(),
            cfg.vehicle.watchdog(),
            Duration::from_millis(cfg.telemetry.recv_timeout_ms),
            monitor.clone(),
        )
        .await?;
        sup.spawn("telemetry", tasks::telemetry_poll(nav, sup.shutdown_signal()));
    } else {
        warn!("run: telemetry disabled, take-off will not be automatic");
    }

    sup.spawn("watchdog", tasks::watchdog(arbiter.clone(), cfg.vehicle.watchdog(), sup.shutdown_signal()));

    let ctx = PilotContext {
        arbiter: arbiter.clone(),
        fixes: fixes.clone(),
        waypoints: waypoints.clone(),
        telemetry: monitor,
        require_telemetry: cfg.autopilot.require_telemetry,
    };
    let pilot = Autopilot::new(cfg.autopilot.thresholds());
    let tick = Duration::from_millis(cfg.autopilot.tick_ms);
    sup.spawn("autopilot", tasks::autopilot(ctx, pilot, tick, sup.shutdown_signal()));

    let sessions = SessionManager::bind(&cfg.operator.listen, arbiter.clone(), waypoints).await?;
    sup.spawn("operator", sessions.run(sup.shutdown_signal()));

    if cfg.operator.uplink_enable {
        let op = cfg.operator.clone();
        let shutdown = sup.shutdown_signal();
        sup.spawn("uplink", async move {
            let uplink = Uplink::connect(&op.display, op.connect_retries, op.connect_backoff()).await?;
            uplink.run(fixes, op.uplink_interval(), shutdown).await
        });
    }

    let result = sup.wait().await;
    let h = arbiter.handovers().await;
    info!("run: stopped ({} manual sessions, next seq {})", h.to_manual, arbiter.next_seq().await);
    result
}
