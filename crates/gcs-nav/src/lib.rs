pub mod autopilot;
pub mod doctor;
pub mod fix;
pub mod geodesy;
pub mod gnss;
pub mod waypoints;

pub use autopilot::{Autopilot, Decision, PilotState, Target, Thresholds, TickInput};
pub use fix::{FixSnapshot, FixTracker};
pub use waypoints::WaypointStore;
