//! Trade side and decision direction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Side of an order or trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
}

/// Outcome of a consensus decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("side must be LONG or SHORT, got '{0}'")]
pub struct SideParseError(pub String);

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    /// +1.0 for long, -1.0 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = SideParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(Side::Long),
            "SHORT" => Ok(Side::Short),
            _ => Err(SideParseError(s.to_string())),
        }
    }
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
            Direction::Hold => "HOLD",
        }
    }

    /// The tradable side, or `None` for HOLD.
    pub fn side(&self) -> Option<Side> {
        match self {
            Direction::Long => Some(Side::Long),
            Direction::Short => Some(Side::Short),
            Direction::Hold => None,
        }
    }
}

impl From<Side> for Direction {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => Direction::Long,
            Side::Short => Direction::Short,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("long".parse::<Side>().unwrap(), Side::Long);
        assert_eq!(" Short ".parse::<Side>().unwrap(), Side::Short);
    }

    #[test]
    fn side_rejects_hold() {
        let err = "HOLD".parse::<Side>().unwrap_err();
        assert_eq!(err, SideParseError("HOLD".into()));
    }

    #[test]
    fn direction_serializes_screaming() {
        assert_eq!(serde_json::to_string(&Direction::Hold).unwrap(), "\"HOLD\"");
        assert_eq!(serde_json::to_string(&Side::Short).unwrap(), "\"SHORT\"");
    }

    #[test]
    fn direction_side_mapping() {
        assert_eq!(Direction::Long.side(), Some(Side::Long));
        assert_eq!(Direction::Hold.side(), None);
        assert_eq!(Direction::from(Side::Short), Direction::Short);
    }
}
