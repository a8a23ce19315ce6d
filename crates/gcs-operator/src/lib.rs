pub mod doctor;
pub mod session;
pub mod uplink;

pub use session::{SessionManager, SessionSummary};
pub use uplink::Uplink;

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    /// Command channel listen address.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Display the fix reports are streamed to.
    #[serde(default = "default_display")]
    pub display: String,

    #[serde(default = "default_true")]
    pub uplink_enable: bool,
    #[serde(default = "default_uplink_interval_ms")]
    pub uplink_interval_ms: u64,

    /// Extra connection attempts before the display is declared unreachable.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,

    #[serde(default = "default_max_waypoints")]
    pub max_waypoints: usize,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            display: default_display(),
            uplink_enable: true,
            uplink_interval_ms: default_uplink_interval_ms(),
            connect_retries: default_connect_retries(),
            connect_backoff_ms: default_connect_backoff_ms(),
            max_waypoints: default_max_waypoints(),
        }
    }
}

impl OperatorConfig {
    pub fn uplink_interval(&self) -> Duration {
        Duration::from_millis(self.uplink_interval_ms)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }
}

fn default_listen() -> String { "0.0.0.0:5558".into() }
fn default_display() -> String { "127.0.0.1:5559".into() }
fn default_true() -> bool { true }
fn default_uplink_interval_ms() -> u64 { 1000 }
fn default_connect_retries() -> u32 { 5 }
fn default_connect_backoff_ms() -> u64 { 500 }
fn default_max_waypoints() -> usize { gcs_nav::waypoints::DEFAULT_CAPACITY }
