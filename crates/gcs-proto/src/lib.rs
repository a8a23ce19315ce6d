pub mod maneuver;
pub mod operator;
pub mod point;
pub mod report;

pub use maneuver::Maneuver;
pub use operator::{OperatorMessage, ParseError};
pub use point::GpsPoint;
pub use report::FixReport;

use serde::{Deserialize, Serialize};

/// Which party currently owns the vehicle command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Authority {
    #[default]
    Autonomous,
    Manual,
}
