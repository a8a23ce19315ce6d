//! Line protocol spoken by the remote operator on the command channel.
//!
//! ```text
//! manual
//! cmd moveforward
//! list2 38.9 -95.2 38.8 -95.1
//! ```

use std::str::FromStr;

use crate::maneuver::{Maneuver, UnknownManeuver};
use crate::point::GpsPoint;

/// One parsed operator line.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorMessage {
    /// Claim the command channel for this session.
    Manual,
    Command(Maneuver),
    Waypoints(Vec<GpsPoint>),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("unrecognized message: {0:?}")]
    Unrecognized(String),
    #[error("missing maneuver after `cmd`")]
    MissingManeuver,
    #[error(transparent)]
    Maneuver(#[from] UnknownManeuver),
    #[error("bad waypoint count: {0:?}")]
    BadCount(String),
    #[error("waypoint list declares {declared} points but carries {coords} coordinates")]
    CountMismatch { declared: usize, coords: usize },
    #[error("bad coordinate: {0:?}")]
    BadCoordinate(String),
    #[error("waypoint {index} out of range: {lat} {lon}")]
    OutOfRange { index: usize, lat: f64, lon: f64 },
}

impl FromStr for OperatorMessage {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        let mut tokens = line.split_whitespace();
        let head = tokens.next().ok_or(ParseError::Empty)?;

        if head == "manual" {
            return Ok(OperatorMessage::Manual);
        }
        if head == "cmd" {
            let kw = tokens.next().ok_or(ParseError::MissingManeuver)?;
            return Ok(OperatorMessage::Command(kw.parse()?));
        }
        if let Some(count) = head.strip_prefix("list") {
            // Accept both `list2 ...` and `list 2 ...`.
            let count = if count.is_empty() {
                tokens.next().ok_or_else(|| ParseError::BadCount(String::new()))?
            } else {
                count
            };
            let declared: usize = count
                .parse()
                .map_err(|_| ParseError::BadCount(count.to_string()))?;
            return parse_waypoints(declared, tokens).map(OperatorMessage::Waypoints);
        }

        Err(ParseError::Unrecognized(line.to_string()))
    }
}

fn parse_waypoints<'a>(
    declared: usize,
    tokens: impl Iterator<Item = &'a str>,
) -> Result<Vec<GpsPoint>, ParseError> {
    let coords = tokens
        .map(|t| t.parse::<f64>().map_err(|_| ParseError::BadCoordinate(t.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    let expected = declared
        .checked_mul(2)
        .ok_or_else(|| ParseError::BadCount(declared.to_string()))?;
    if coords.len() != expected {
        return Err(ParseError::CountMismatch { declared, coords: coords.len() });
    }

    coords
        .chunks_exact(2)
        .enumerate()
        .map(|(index, pair)| {
            let p = GpsPoint::new(pair[0], pair[1]);
            if p.is_valid() {
                Ok(p)
            } else {
                Err(ParseError::OutOfRange { index, lat: p.lat, lon: p.lon })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manual_and_commands() {
        assert_eq!("manual".parse::<OperatorMessage>(), Ok(OperatorMessage::Manual));
        assert_eq!("cmd takeoff\n".parse::<OperatorMessage>(), Ok(OperatorMessage::Command(Maneuver::TakeOff)));
        assert_eq!("cmd turnright".parse::<OperatorMessage>(), Ok(OperatorMessage::Command(Maneuver::RotateRight)));
        assert_eq!("cmd movedown".parse::<OperatorMessage>(), Ok(OperatorMessage::Command(Maneuver::MoveDown)));
    }

    #[test]
    fn parses_two_point_list() {
        let msg: OperatorMessage = "list2 38.9 -95.2 38.8 -95.1".parse().unwrap();
        assert_eq!(
            msg,
            OperatorMessage::Waypoints(vec![GpsPoint::new(38.9, -95.2), GpsPoint::new(38.8, -95.1)])
        );
    }

    #[test]
    fn list_with_separate_count() {
        let msg: OperatorMessage = "list 1 10.5 20.25".parse().unwrap();
        assert_eq!(msg, OperatorMessage::Waypoints(vec![GpsPoint::new(10.5, 20.25)]));
    }

    #[test]
    fn empty_list_is_allowed() {
        assert_eq!("list0".parse::<OperatorMessage>(), Ok(OperatorMessage::Waypoints(Vec::new())));
    }

    #[test]
    fn trailing_nul_padding_is_ignored() {
        assert_eq!("manual\0\0\0".parse::<OperatorMessage>(), Ok(OperatorMessage::Manual));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!("".parse::<OperatorMessage>(), Err(ParseError::Empty));
        assert_eq!("cmd".parse::<OperatorMessage>(), Err(ParseError::MissingManeuver));
        assert!(matches!("cmd fly".parse::<OperatorMessage>(), Err(ParseError::Maneuver(_))));
        assert!(matches!("hello".parse::<OperatorMessage>(), Err(ParseError::Unrecognized(_))));
        assert!(matches!("listx 1 2".parse::<OperatorMessage>(), Err(ParseError::BadCount(_))));
        assert!(matches!(
            "list10000000000000000000 1 2".parse::<OperatorMessage>(),
            Err(ParseError::BadCount(_))
        ));
        assert_eq!(
            "list2 38.9 -95.2 38.8".parse::<OperatorMessage>(),
            Err(ParseError::CountMismatch { declared: 2, coords: 3 })
        );
        assert!(matches!("list1 abc 1".parse::<OperatorMessage>(), Err(ParseError::BadCoordinate(_))));
        assert!(matches!("list1 95.0 1".parse::<OperatorMessage>(), Err(ParseError::OutOfRange { index: 0, .. })));
    }
}
