use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::ledger::error::IngestError;
use crate::ledger::stats::PlayerStats;
use crate::ledger::types::{
    DartNumber, GameVariant, LegId, MatchId, OutMode, PlayerId, ThrowId, TurnId,
};

pub mod in_memory;
pub mod sea_orm;

pub use in_memory::InMemoryIngestStorage;
pub use sea_orm::SeaOrmIngestStorage;

/// Opens units of work. Every delivery is applied inside exactly one.
#[async_trait]
pub trait IngestStorage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn IngestStorageTxn + Send>, IngestError>;
}

/// One atomic unit of work. Nothing is visible to other units until `commit`.
#[async_trait]
pub trait IngestStorageTxn: Send {
    async fn load_player(&mut self, id: PlayerId) -> Result<Option<PlayerRow>, IngestError>;

    async fn find_player_by_user_id(
        &mut self,
        user_id: &str,
    ) -> Result<Option<PlayerRow>, IngestError>;

    /// Lowest-id player carrying exactly this display name, skipping `exclude`.
    async fn find_player_by_name(
        &mut self,
        name: &str,
        exclude: &[PlayerId],
    ) -> Result<Option<PlayerRow>, IngestError>;

    async fn insert_player(&mut self, player: NewPlayer) -> Result<PlayerId, IngestError>;

    async fn update_player(&mut self, player: &PlayerRow) -> Result<(), IngestError>;

    async fn find_match(&mut self, external_id: &str) -> Result<Option<MatchRow>, IngestError>;

    /// Like `find_match`, but holds the row exclusively until the unit of work ends.
    async fn lock_match(&mut self, external_id: &str) -> Result<Option<MatchRow>, IngestError>;

    async fn insert_match(&mut self, row: NewMatch) -> Result<MatchId, IngestError>;

    async fn update_match(&mut self, row: &MatchRow) -> Result<(), IngestError>;

    /// Participants ordered by `player_index`.
    async fn load_match_players(
        &mut self,
        match_id: MatchId,
    ) -> Result<Vec<MatchPlayerRow>, IngestError>;

    async fn insert_match_player(&mut self, row: NewMatchPlayer) -> Result<i64, IngestError>;

    async fn update_match_player(&mut self, row: &MatchPlayerRow) -> Result<(), IngestError>;

    async fn find_leg(
        &mut self,
        match_id: MatchId,
        set_number: i32,
        leg_number: i32,
    ) -> Result<Option<LegRow>, IngestError>;

    async fn load_leg(&mut self, id: LegId) -> Result<Option<LegRow>, IngestError>;

    /// Legs ordered by `(set_number, leg_number)`.
    async fn load_legs(&mut self, match_id: MatchId) -> Result<Vec<LegRow>, IngestError>;

    async fn insert_leg(&mut self, row: NewLeg) -> Result<LegId, IngestError>;

    async fn update_leg(&mut self, row: &LegRow) -> Result<(), IngestError>;

    async fn load_leg_players(&mut self, leg_id: LegId)
        -> Result<Vec<LegPlayerRow>, IngestError>;

    /// Insert or replace the association keyed by `(leg_id, player_id)`.
    async fn upsert_leg_player(&mut self, row: LegPlayerRow) -> Result<(), IngestError>;

    async fn find_turn(&mut self, external_id: &str) -> Result<Option<TurnRow>, IngestError>;

    async fn insert_turn(&mut self, row: NewTurn) -> Result<TurnId, IngestError>;

    async fn update_turn(&mut self, row: &TurnRow) -> Result<(), IngestError>;

    /// Turns of a match ordered by `(leg_id, round_number, id)`.
    async fn load_match_turns(&mut self, match_id: MatchId) -> Result<Vec<TurnRow>, IngestError>;

    /// Every stored version for one dart slot, oldest first.
    async fn load_slot(
        &mut self,
        turn_id: TurnId,
        dart_number: DartNumber,
    ) -> Result<Vec<DartThrowRow>, IngestError>;

    async fn insert_throw(&mut self, row: NewDartThrow) -> Result<ThrowId, IngestError>;

    async fn mark_corrected(
        &mut self,
        throw_id: ThrowId,
        corrected_at: DateTime<Utc>,
        corrected_by: ThrowId,
    ) -> Result<(), IngestError>;

    /// Throws of the given turns ordered by `(turn_id, dart_number, id)`.
    async fn load_throws(
        &mut self,
        turn_ids: &[TurnId],
        include_corrected: bool,
    ) -> Result<Vec<DartThrowRow>, IngestError>;

    /// Remove every derived row below the match: throws, turns, leg
    /// associations, legs and match associations. The match row itself stays.
    async fn purge_match_state(&mut self, match_id: MatchId) -> Result<PurgeCounts, IngestError>;

    /// Moves `from`'s turns and leg wins in one match over to `to`, then drops
    /// `from`'s participant row and leg associations there. Returns the legs
    /// that changed hands.
    async fn reassign_match_player(
        &mut self,
        match_id: MatchId,
        from: PlayerId,
        to: PlayerId,
    ) -> Result<Vec<LegId>, IngestError>;

    async fn commit(self: Box<Self>) -> Result<(), IngestError>;
    async fn rollback(self: Box<Self>);
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerRow {
    pub id: PlayerId,
    pub user_id: Option<String>,
    pub name: String,
    pub avatar_url: Option<String>,
    pub country: Option<String>,
    pub account_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewPlayer {
    pub user_id: Option<String>,
    pub name: String,
    pub avatar_url: Option<String>,
    pub country: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MatchSettings {
    pub base_score: Option<i32>,
    pub in_mode: Option<String>,
    pub out_mode: Option<String>,
    pub bull_mode: Option<String>,
    pub max_rounds: Option<i32>,
    pub match_mode_type: Option<String>,
    pub match_mode_legs: Option<i32>,
    pub match_mode_sets: Option<i32>,
    pub extra: JsonValue,
}

impl MatchSettings {
    pub fn out_mode(&self) -> OutMode {
        OutMode::parse(self.out_mode.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchRow {
    pub id: MatchId,
    pub external_id: String,
    pub variant: String,
    pub match_type: Option<String>,
    pub settings: MatchSettings,
    pub winner_player_id: Option<PlayerId>,
    pub current_set: i32,
    pub current_leg: i32,
    pub current_round: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Owned by the timeout sweep; never written here.
    pub incomplete: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MatchRow {
    pub fn game_variant(&self) -> GameVariant {
        GameVariant::parse(&self.variant)
    }

    /// Back to the state of a match nobody has reported on yet.
    pub fn reset_status(&mut self) {
        self.winner_player_id = None;
        self.finished_at = None;
        self.started_at = None;
        self.current_set = 1;
        self.current_leg = 1;
        self.current_round = 1;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewMatch {
    pub external_id: String,
    pub variant: String,
    pub match_type: Option<String>,
    pub settings: MatchSettings,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchPlayerRow {
    pub id: i64,
    pub match_id: MatchId,
    pub player_id: PlayerId,
    pub player_index: i32,
    pub handle: Option<String>,
    pub legs_won: i32,
    pub sets_won: i32,
    pub stats: PlayerStats,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewMatchPlayer {
    pub match_id: MatchId,
    pub player_id: PlayerId,
    pub player_index: i32,
    pub handle: Option<String>,
    pub legs_won: i32,
    pub sets_won: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LegRow {
    pub id: LegId,
    pub match_id: MatchId,
    pub set_number: i32,
    pub leg_number: i32,
    pub winner_player_id: Option<PlayerId>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewLeg {
    pub match_id: MatchId,
    pub set_number: i32,
    pub leg_number: i32,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LegPlayerRow {
    pub leg_id: LegId,
    pub match_id: MatchId,
    pub player_id: PlayerId,
    pub won: bool,
    pub stats: PlayerStats,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnRow {
    pub id: TurnId,
    pub external_id: String,
    pub match_id: MatchId,
    pub leg_id: LegId,
    pub player_id: PlayerId,
    pub round_number: i32,
    pub points: i32,
    pub score: i32,
    pub busted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewTurn {
    pub external_id: String,
    pub match_id: MatchId,
    pub leg_id: LegId,
    pub player_id: PlayerId,
    pub round_number: i32,
    pub points: i32,
    pub score: i32,
    pub busted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DartThrowRow {
    pub id: ThrowId,
    pub external_id: String,
    pub turn_id: TurnId,
    pub dart_number: DartNumber,
    pub segment_number: i32,
    pub multiplier: i32,
    pub points: i32,
    pub segment_name: Option<String>,
    pub bed: Option<String>,
    pub coord_x: Option<f64>,
    pub coord_y: Option<f64>,
    pub thrown_at: Option<DateTime<Utc>>,
    pub is_corrected: bool,
    pub corrected_at: Option<DateTime<Utc>>,
    pub corrected_by: Option<ThrowId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewDartThrow {
    pub external_id: String,
    pub turn_id: TurnId,
    pub dart_number: DartNumber,
    pub segment_number: i32,
    pub multiplier: i32,
    pub points: i32,
    pub segment_name: Option<String>,
    pub bed: Option<String>,
    pub coord_x: Option<f64>,
    pub coord_y: Option<f64>,
    pub thrown_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PurgeCounts {
    pub throws: u64,
    pub turns: u64,
    pub leg_players: u64,
    pub legs: u64,
    pub match_players: u64,
}
