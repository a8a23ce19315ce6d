use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of flight maneuvers the station can ask the vehicle for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Maneuver {
    TakeOff,
    Land,
    Hover,
    MoveUp,
    MoveDown,
    MoveForward,
    MoveBack,
    MoveLeft,
    MoveRight,
    RotateLeft,
    RotateRight,
}

impl Maneuver {
    pub const ALL: [Maneuver; 11] = [
        Maneuver::TakeOff,
        Maneuver::Land,
        Maneuver::Hover,
        Maneuver::MoveUp,
        Maneuver::MoveDown,
        Maneuver::MoveForward,
        Maneuver::MoveBack,
        Maneuver::MoveLeft,
        Maneuver::MoveRight,
        Maneuver::RotateLeft,
        Maneuver::RotateRight,
    ];

    /// Keyword used on the operator command channel (`cmd <keyword>`).
    pub fn keyword(self) -> &'static str {
        match self {
            Maneuver::TakeOff => "takeoff",
            Maneuver::Land => "land",
            Maneuver::Hover => "hover",
            Maneuver::MoveUp => "moveup",
            Maneuver::MoveDown => "movedown",
            Maneuver::MoveForward => "moveforward",
            Maneuver::MoveBack => "moveback",
            Maneuver::MoveLeft => "moveleft",
            Maneuver::MoveRight => "moveright",
            Maneuver::RotateLeft => "turnleft",
            Maneuver::RotateRight => "turnright",
        }
    }

    pub fn is_rotation(self) -> bool {
        matches!(self, Maneuver::RotateLeft | Maneuver::RotateRight)
    }
}

impl fmt::Display for Maneuver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown maneuver: {0}")]
pub struct UnknownManeuver(pub String);

impl FromStr for Maneuver {
    type Err = UnknownManeuver;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Maneuver::ALL
            .into_iter()
            .find(|m| m.keyword().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownManeuver(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_parse_back() {
        for m in Maneuver::ALL {
            assert_eq!(m.keyword().parse::<Maneuver>(), Ok(m));
        }
    }

    #[test]
    fn operator_spellings() {
        assert_eq!("turnleft".parse::<Maneuver>(), Ok(Maneuver::RotateLeft));
        assert_eq!("TAKEOFF".parse::<Maneuver>(), Ok(Maneuver::TakeOff));
        assert!("barrelroll".parse::<Maneuver>().is_err());
    }
}
