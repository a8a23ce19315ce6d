pub mod arbiter;
pub mod at;
pub mod doctor;
pub mod link;
pub mod navdata;
pub mod retry;
pub mod state;
pub mod telemetry;

pub use arbiter::{Arbiter, Handovers, Issued};
pub use at::{AtCodec, AtCommand, Speeds};
pub use link::DroneLink;
pub use retry::SendRetry;
pub use state::{TelemetryMonitor, TelemetryStatus};
pub use telemetry::NavdataLink;

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleConfig {
    /// Vehicle address; the drone's access point usually hands out 192.168.1.1.
    pub host: String,

    #[serde(default = "default_command_port")]
    pub command_port: u16,

    #[serde(default = "default_navdata_port")]
    pub navdata_port: u16,

    /// Longest silence on the command port before a watchdog frame goes out.
    #[serde(default = "default_watchdog_ms")]
    pub watchdog_ms: u64,

    /// Extra attempts for a failed command send before the link is declared dead.
    #[serde(default = "default_send_retries")]
    pub send_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Fractions of full rate used for progressive commands.
    #[serde(default = "default_speed")]
    pub move_speed: f32,
    #[serde(default = "default_speed")]
    pub climb_speed: f32,
    #[serde(default = "default_speed")]
    pub rotate_speed: f32,
}

impl VehicleConfig {
    pub fn speeds(&self) -> Speeds {
        Speeds { translate: self.move_speed, vertical: self.climb_speed, yaw: self.rotate_speed }
    }

    pub fn retry(&self) -> SendRetry {
        SendRetry { retries: self.send_retries, backoff: Duration::from_millis(self.retry_backoff_ms) }
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enable: true, recv_timeout_ms: default_recv_timeout_ms() }
    }
}

fn default_command_port() -> u16 { 5556 }
fn default_navdata_port() -> u16 { 5554 }
fn default_watchdog_ms() -> u64 { 200 }
fn default_send_retries() -> u32 { 2 }
fn default_retry_backoff_ms() -> u64 { 20 }
fn default_speed() -> f32 { 1.0 }
fn default_true() -> bool { true }
fn default_recv_timeout_ms() -> u64 { 500 }
