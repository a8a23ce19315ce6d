use serde::{Deserialize, Serialize};

use gcs_proto::{Authority, GpsPoint, Maneuver};

use crate::fix::FixSnapshot;
use crate::geodesy;

/// Fixes can be off by about 3 m; closer than this counts as "at" the waypoint.
pub const LOCATION_EPSILON_KM: f64 = 0.003;
/// Heading error beyond which the controller turns toward the bearing.
pub const HEADING_EPSILON_DEG: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub location_epsilon_km: f64,
    pub heading_epsilon_deg: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            location_epsilon_km: LOCATION_EPSILON_KM,
            heading_epsilon_deg: HEADING_EPSILON_DEG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PilotState {
    Idle,
    Approaching,
    Rotating,
    Arrived,
}

/// The active waypoint as seen by one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub index: usize,
    pub point: GpsPoint,
    /// Another waypoint follows this one.
    pub has_next: bool,
}

/// Everything one tick decides on, copied out of the shared state beforehand.
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    pub authority: Authority,
    pub fix: FixSnapshot,
    pub target: Option<Target>,
    /// `Some(false)` when telemetry says the vehicle is on the ground.
    pub airborne: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub state: PilotState,
    pub maneuver: Option<Maneuver>,
    /// Waypoint index reached this tick; the caller advances the store past it.
    pub reached: Option<usize>,
    pub message: String,
}

impl Decision {
    fn idle(message: impl Into<String>) -> Self {
        Self { state: PilotState::Idle, maneuver: None, reached: None, message: message.into() }
    }
}

/// Waypoint-following state machine. Pure: it never touches I/O or locks.
#[derive(Debug, Clone)]
pub struct Autopilot {
    thresholds: Thresholds,
    state: PilotState,
    just_rotated: bool,
}

impl Default for Autopilot {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl Autopilot {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds, state: PilotState::Idle, just_rotated: false }
    }

    pub fn state(&self) -> PilotState {
        self.state
    }

    pub fn step(&mut self, input: &TickInput) -> Decision {
        let d = self.decide(input);
        self.state = d.state;
        self.just_rotated = d.maneuver.is_some_and(Maneuver::is_rotation);
        d
    }

    fn decide(&self, input: &TickInput) -> Decision {
        if input.authority != Authority::Autonomous {
            return Decision::idle("IDLE: manual operator has authority");
        }
        let curr = input.fix.current;
        if !curr.is_valid() {
            return Decision::idle("IDLE: no GPS fix");
        }
        let Some(target) = input.target else {
            return Decision::idle("IDLE: no active waypoint");
        };

        let dist_km = geodesy::distance(curr, target.point);
        if dist_km <= self.thresholds.location_epsilon_km {
            let (maneuver, what) = if target.has_next {
                (Maneuver::Hover, "hover, next waypoint")
            } else {
                (Maneuver::Land, "land, route complete")
            };
            return Decision {
                state: PilotState::Arrived,
                maneuver: Some(maneuver),
                reached: Some(target.index),
                message: format!("ARRIVED: waypoint {} ({:.1} m), {}", target.index, dist_km * 1000.0, what),
            };
        }

        if input.airborne == Some(false) {
            return Decision {
                state: PilotState::Approaching,
                maneuver: Some(Maneuver::TakeOff),
                reached: None,
                message: format!("TAKEOFF: waypoint {} is {:.0} m away", target.index, dist_km * 1000.0),
            };
        }

        let desired = geodesy::bearing(curr, target.point);
        let prev = input.fix.previous;
        if !prev.is_valid() || prev == curr {
            return self.advance(dist_km, desired, None);
        }

        let heading = geodesy::heading(curr, prev);
        let error = geodesy::normalize_signed_180(heading - desired);

        if error.abs() > self.thresholds.heading_epsilon_deg && !self.just_rotated {
            let maneuver = if error > 0.0 { Maneuver::RotateLeft } else { Maneuver::RotateRight };
            return Decision {
                state: PilotState::Rotating,
                maneuver: Some(maneuver),
                reached: None,
                message: format!(
                    "ROTATE {}: heading {:.1} bearing {:.1} error {:+.1}",
                    if error > 0.0 { "left" } else { "right" }, heading, desired, error
                ),
            };
        }

        self.advance(dist_km, desired, Some(error))
    }

    fn advance(&self, dist_km: f64, desired: f64, error: Option<f64>) -> Decision {
        let err = error.map_or_else(|| "unknown".to_string(), |e| format!("{:+.1}", e));
        Decision {
            state: PilotState::Approaching,
            maneuver: Some(Maneuver::MoveForward),
            reached: None,
            message: format!("APPROACH: {:.0} m, bearing {:.1}, heading error {}", dist_km * 1000.0, desired, err),
        }
    }
}
