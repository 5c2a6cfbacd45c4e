//! Inbound webhook payloads.
//!
//! Deliveries are parsed once, at the boundary, into [`WebhookEvent`]. Anything
//! that does not fit one of the two known shapes is rejected before it can touch
//! storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::error::IngestError;
use super::types::{DartNumber, DARTS_PER_TURN};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WebhookEvent {
    MatchState(MatchStateEvent),
    Throw(ThrowEvent),
}

impl WebhookEvent {
    pub fn from_value(value: &JsonValue) -> Result<Self, IngestError> {
        let event = WebhookEvent::deserialize(value)?;
        event.validate()?;
        Ok(event)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEvent::MatchState(_) => "match_state",
            WebhookEvent::Throw(_) => "throw",
        }
    }

    pub fn match_id(&self) -> &str {
        match self {
            WebhookEvent::MatchState(event) => &event.match_id,
            WebhookEvent::Throw(event) => &event.match_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            WebhookEvent::MatchState(event) => event.timestamp,
            WebhookEvent::Throw(event) => event.timestamp,
        }
    }

    fn validate(&self) -> Result<(), IngestError> {
        if self.match_id().trim().is_empty() {
            return Err(IngestError::validation("matchId must not be empty"));
        }
        match self {
            WebhookEvent::MatchState(event) => {
                let state = &event.data.match_state;
                if state.players.is_empty() {
                    return Err(IngestError::validation("match_state carries no players"));
                }
                if state.set < 1 || state.leg < 1 {
                    return Err(IngestError::validation(format!(
                        "invalid leg counters set={} leg={}",
                        state.set, state.leg
                    )));
                }
                for turn in &state.turns {
                    if turn.id.trim().is_empty() {
                        return Err(IngestError::validation("turn id must not be empty"));
                    }
                    for throw in &turn.throws {
                        throw.validate()?;
                    }
                }
                Ok(())
            }
            WebhookEvent::Throw(event) => {
                if event.data.turn_id.trim().is_empty() {
                    return Err(IngestError::validation("turnId must not be empty"));
                }
                if event.data.set < 1 || event.data.leg < 1 {
                    return Err(IngestError::validation(format!(
                        "invalid leg counters set={} leg={}",
                        event.data.set, event.data.leg
                    )));
                }
                event.data.throw.validate()
            }
        }
    }
}

/// Full-state snapshot of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStateEvent {
    pub timestamp: DateTime<Utc>,
    pub match_id: String,
    #[serde(default)]
    pub variant: Option<String>,
    pub data: MatchStateData,
}

impl MatchStateEvent {
    /// Variant named by the envelope, falling back to the one inside the match body.
    pub fn variant_name(&self) -> Option<&str> {
        self.variant
            .as_deref()
            .or(self.data.match_state.variant.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStateData {
    #[serde(rename = "match")]
    pub match_state: MatchPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub match_type: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished: bool,
    /// Index into `players`; producers send `-1` while nobody has won.
    #[serde(default)]
    pub winner: Option<i32>,
    #[serde(default)]
    pub settings: MatchSettingsPayload,
    pub players: Vec<PlayerPayload>,
    #[serde(default)]
    pub scores: Vec<ScorePayload>,
    pub leg: i32,
    pub set: i32,
    #[serde(default)]
    pub round: i32,
    #[serde(default)]
    pub turns: Vec<TurnPayload>,
}

impl MatchPayload {
    pub fn winner_index(&self) -> Option<usize> {
        self.winner.and_then(|idx| usize::try_from(idx).ok())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSettingsPayload {
    #[serde(default)]
    pub base_score: Option<i32>,
    #[serde(default)]
    pub in_mode: Option<String>,
    #[serde(default)]
    pub out_mode: Option<String>,
    #[serde(default)]
    pub bull_mode: Option<String>,
    #[serde(default)]
    pub max_rounds: Option<i32>,
    #[serde(default)]
    pub match_mode_type: Option<String>,
    #[serde(default)]
    pub match_mode_legs_count: Option<i32>,
    #[serde(default)]
    pub match_mode_sets_count: Option<i32>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPayload {
    /// Match-scoped handle; turns and throw events refer to players by it.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub user: Option<UserPayload>,
}

impl PlayerPayload {
    pub fn country(&self) -> Option<&str> {
        self.user.as_ref().and_then(|user| user.country.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePayload {
    #[serde(default)]
    pub legs: i32,
    #[serde(default)]
    pub sets: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnPayload {
    pub id: String,
    pub player_id: String,
    #[serde(default)]
    pub round: i32,
    #[serde(default)]
    pub points: i32,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub busted: bool,
    #[serde(default)]
    pub throws: Vec<ThrowPayload>,
}

/// Incremental single-dart event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrowEvent {
    pub timestamp: DateTime<Utc>,
    pub match_id: String,
    pub data: ThrowData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrowData {
    pub turn_id: String,
    pub player_id: String,
    #[serde(default)]
    pub player_name: Option<String>,
    pub leg: i32,
    pub set: i32,
    #[serde(default)]
    pub round: i32,
    /// Remaining score after this dart.
    pub score: i32,
    #[serde(default)]
    pub busted: Option<bool>,
    pub throw: ThrowPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrowPayload {
    pub id: String,
    #[serde(rename = "throw")]
    pub dart_number: DartNumber,
    pub segment: SegmentPayload,
    #[serde(default)]
    pub coords: Option<CoordsPayload>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ThrowPayload {
    fn validate(&self) -> Result<(), IngestError> {
        if self.id.trim().is_empty() {
            return Err(IngestError::validation("throw id must not be empty"));
        }
        let in_range = u32::try_from(self.dart_number)
            .map(|dart| dart < DARTS_PER_TURN)
            .unwrap_or(false);
        if !in_range {
            return Err(IngestError::validation(format!(
                "dart number {} outside 0..{}",
                self.dart_number, DARTS_PER_TURN
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPayload {
    pub number: i32,
    pub multiplier: i32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bed: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordsPayload {
    pub x: f64,
    pub y: f64,
}
