use std::fmt;

use serde::{Deserialize, Serialize};

pub type PlayerId = i64;
pub type MatchId = i64;
pub type LegId = i64;
pub type TurnId = i64;
pub type ThrowId = i64;
pub type CallId = i64;

/// Dart position within a turn, `0..DARTS_PER_TURN`.
pub type DartNumber = i32;

pub const DARTS_PER_TURN: u32 = 3;

/// How a variant turns darts into progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoringKind {
    /// Points subtracted from a base score (X01 family).
    Points,
    /// Marks on a closed set of segments (Cricket family).
    Marks,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameVariant {
    X01,
    Cricket,
    Tactics,
    Other(String),
}

impl GameVariant {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "x01" => GameVariant::X01,
            "cricket" => GameVariant::Cricket,
            "tactics" => GameVariant::Tactics,
            _ => GameVariant::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GameVariant::X01 => "X01",
            GameVariant::Cricket => "Cricket",
            GameVariant::Tactics => "Tactics",
            GameVariant::Other(name) => name,
        }
    }

    pub fn scoring(&self) -> ScoringKind {
        match self {
            GameVariant::Cricket | GameVariant::Tactics => ScoringKind::Marks,
            GameVariant::X01 | GameVariant::Other(_) => ScoringKind::Points,
        }
    }
}

impl Default for GameVariant {
    fn default() -> Self {
        GameVariant::X01
    }
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finishing rule for points variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutMode {
    Straight,
    Double,
    Master,
}

impl OutMode {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()) {
            Some(value) if value == "double" => OutMode::Double,
            Some(value) if value == "master" => OutMode::Master,
            _ => OutMode::Straight,
        }
    }

    /// Highest remaining score that can still be finished in one turn, when
    /// the mode counts checkout attempts at all.
    pub fn max_checkout(self) -> Option<i32> {
        match self {
            OutMode::Straight => None,
            OutMode::Double => Some(170),
            OutMode::Master => Some(180),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_parsing_is_case_insensitive() {
        assert_eq!(GameVariant::parse("x01"), GameVariant::X01);
        assert_eq!(GameVariant::parse(" Cricket "), GameVariant::Cricket);
        assert_eq!(
            GameVariant::parse("Bermuda"),
            GameVariant::Other("Bermuda".into())
        );
        assert_eq!(GameVariant::Cricket.scoring(), ScoringKind::Marks);
        assert_eq!(GameVariant::parse("Bermuda").scoring(), ScoringKind::Points);
    }

    #[test]
    fn out_mode_defaults_to_straight() {
        assert_eq!(OutMode::parse(None), OutMode::Straight);
        assert_eq!(OutMode::parse(Some("Double")), OutMode::Double);
        assert_eq!(OutMode::parse(Some("MASTER")), OutMode::Master);
        assert_eq!(OutMode::Straight.max_checkout(), None);
        assert_eq!(OutMode::Double.max_checkout(), Some(170));
    }
}
