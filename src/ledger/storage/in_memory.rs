use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::ledger::error::IngestError;
use crate::ledger::stats::PlayerStats;
use crate::ledger::types::{DartNumber, LegId, MatchId, PlayerId, ThrowId, TurnId};

use super::{
    DartThrowRow, IngestStorage, IngestStorageTxn, LegPlayerRow, LegRow, MatchPlayerRow,
    MatchRow, NewDartThrow, NewLeg, NewMatch, NewMatchPlayer, NewPlayer, NewTurn, PlayerRow,
    PurgeCounts, TurnRow,
};

#[derive(Clone, Default)]
struct Sequences {
    player: i64,
    matches: i64,
    match_player: i64,
    leg: i64,
    turn: i64,
    throw: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Clone, Default)]
struct Tables {
    players: BTreeMap<PlayerId, PlayerRow>,
    matches: BTreeMap<MatchId, MatchRow>,
    match_players: BTreeMap<i64, MatchPlayerRow>,
    legs: BTreeMap<LegId, LegRow>,
    leg_players: BTreeMap<(LegId, PlayerId), LegPlayerRow>,
    turns: BTreeMap<TurnId, TurnRow>,
    throws: BTreeMap<ThrowId, DartThrowRow>,
    seq: Sequences,
}

/// Row counts per table, used to compare two ledgers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub players: usize,
    pub matches: usize,
    pub match_players: usize,
    pub legs: usize,
    pub leg_players: usize,
    pub turns: usize,
    pub throws: usize,
}

/// Storage held entirely in process. A unit of work owns the whole store for
/// its lifetime and works on a private copy that replaces the shared one on
/// commit, so rollback is simply dropping the copy.
#[derive(Clone, Default)]
pub struct InMemoryIngestStorage {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryIngestStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn table_counts(&self) -> TableCounts {
        let tables = self.tables.lock().await;
        TableCounts {
            players: tables.players.len(),
            matches: tables.matches.len(),
            match_players: tables.match_players.len(),
            legs: tables.legs.len(),
            leg_players: tables.leg_players.len(),
            turns: tables.turns.len(),
            throws: tables.throws.len(),
        }
    }
}

pub struct InMemoryIngestTxn {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl IngestStorage for InMemoryIngestStorage {
    async fn begin(&self) -> Result<Box<dyn IngestStorageTxn + Send>, IngestError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryIngestTxn { guard, working }))
    }
}

#[async_trait]
impl IngestStorageTxn for InMemoryIngestTxn {
    async fn load_player(&mut self, id: PlayerId) -> Result<Option<PlayerRow>, IngestError> {
        Ok(self.working.players.get(&id).cloned())
    }

    async fn find_player_by_user_id(
        &mut self,
        user_id: &str,
    ) -> Result<Option<PlayerRow>, IngestError> {
        Ok(self
            .working
            .players
            .values()
            .find(|player| player.user_id.as_deref() == Some(user_id))
            .cloned())
    }

    async fn find_player_by_name(
        &mut self,
        name: &str,
        exclude: &[PlayerId],
    ) -> Result<Option<PlayerRow>, IngestError> {
        Ok(self
            .working
            .players
            .values()
            .find(|player| player.name == name && !exclude.contains(&player.id))
            .cloned())
    }

    async fn insert_player(&mut self, player: NewPlayer) -> Result<PlayerId, IngestError> {
        if let Some(user_id) = player.user_id.as_deref() {
            if self.find_player_by_user_id(user_id).await?.is_some() {
                return Err(IngestError::validation(format!(
                    "player with user id {user_id} already exists"
                )));
            }
        }
        let id = next(&mut self.working.seq.player);
        self.working.players.insert(
            id,
            PlayerRow {
                id,
                user_id: player.user_id,
                name: player.name,
                avatar_url: player.avatar_url,
                country: player.country,
                account_id: None,
            },
        );
        Ok(id)
    }

    async fn update_player(&mut self, player: &PlayerRow) -> Result<(), IngestError> {
        let slot = self
            .working
            .players
            .get_mut(&player.id)
            .ok_or(IngestError::NotFound("player"))?;
        *slot = player.clone();
        Ok(())
    }

    async fn find_match(&mut self, external_id: &str) -> Result<Option<MatchRow>, IngestError> {
        Ok(self
            .working
            .matches
            .values()
            .find(|row| row.external_id == external_id)
            .cloned())
    }

    async fn lock_match(&mut self, external_id: &str) -> Result<Option<MatchRow>, IngestError> {
        // The unit of work already holds the whole store.
        self.find_match(external_id).await
    }

    async fn insert_match(&mut self, row: NewMatch) -> Result<MatchId, IngestError> {
        if self.find_match(&row.external_id).await?.is_some() {
            return Err(IngestError::validation(format!(
                "match {} already exists",
                row.external_id
            )));
        }
        let id = next(&mut self.working.seq.matches);
        self.working.matches.insert(
            id,
            MatchRow {
                id,
                external_id: row.external_id,
                variant: row.variant,
                match_type: row.match_type,
                settings: row.settings,
                winner_player_id: None,
                current_set: 1,
                current_leg: 1,
                current_round: 1,
                started_at: row.started_at,
                finished_at: None,
                incomplete: false,
                updated_at: Some(row.updated_at),
            },
        );
        Ok(id)
    }

    async fn update_match(&mut self, row: &MatchRow) -> Result<(), IngestError> {
        let slot = self
            .working
            .matches
            .get_mut(&row.id)
            .ok_or(IngestError::NotFound("match"))?;
        *slot = row.clone();
        Ok(())
    }

    async fn load_match_players(
        &mut self,
        match_id: MatchId,
    ) -> Result<Vec<MatchPlayerRow>, IngestError> {
        let mut rows: Vec<MatchPlayerRow> = self
            .working
            .match_players
            .values()
            .filter(|row| row.match_id == match_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.player_index, row.id));
        Ok(rows)
    }

    async fn insert_match_player(&mut self, row: NewMatchPlayer) -> Result<i64, IngestError> {
        let id = next(&mut self.working.seq.match_player);
        self.working.match_players.insert(
            id,
            MatchPlayerRow {
                id,
                match_id: row.match_id,
                player_id: row.player_id,
                player_index: row.player_index,
                handle: row.handle,
                legs_won: row.legs_won,
                sets_won: row.sets_won,
                stats: PlayerStats::default(),
            },
        );
        Ok(id)
    }

    async fn update_match_player(&mut self, row: &MatchPlayerRow) -> Result<(), IngestError> {
        let slot = self
            .working
            .match_players
            .get_mut(&row.id)
            .ok_or(IngestError::NotFound("match player"))?;
        *slot = row.clone();
        Ok(())
    }

    async fn find_leg(
        &mut self,
        match_id: MatchId,
        set_number: i32,
        leg_number: i32,
    ) -> Result<Option<LegRow>, IngestError> {
        Ok(self
            .working
            .legs
            .values()
            .find(|leg| {
                leg.match_id == match_id
                    && leg.set_number == set_number
                    && leg.leg_number == leg_number
            })
            .cloned())
    }

    async fn load_leg(&mut self, id: LegId) -> Result<Option<LegRow>, IngestError> {
        Ok(self.working.legs.get(&id).cloned())
    }

    async fn load_legs(&mut self, match_id: MatchId) -> Result<Vec<LegRow>, IngestError> {
        let mut legs: Vec<LegRow> = self
            .working
            .legs
            .values()
            .filter(|leg| leg.match_id == match_id)
            .cloned()
            .collect();
        legs.sort_by_key(|leg| (leg.set_number, leg.leg_number));
        Ok(legs)
    }

    async fn insert_leg(&mut self, row: NewLeg) -> Result<LegId, IngestError> {
        let id = next(&mut self.working.seq.leg);
        self.working.legs.insert(
            id,
            LegRow {
                id,
                match_id: row.match_id,
                set_number: row.set_number,
                leg_number: row.leg_number,
                winner_player_id: None,
                started_at: row.started_at,
                finished_at: None,
            },
        );
        Ok(id)
    }

    async fn update_leg(&mut self, row: &LegRow) -> Result<(), IngestError> {
        let slot = self
            .working
            .legs
            .get_mut(&row.id)
            .ok_or(IngestError::NotFound("leg"))?;
        *slot = row.clone();
        Ok(())
    }

    async fn load_leg_players(
        &mut self,
        leg_id: LegId,
    ) -> Result<Vec<LegPlayerRow>, IngestError> {
        Ok(self
            .working
            .leg_players
            .range((leg_id, PlayerId::MIN)..=(leg_id, PlayerId::MAX))
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn upsert_leg_player(&mut self, row: LegPlayerRow) -> Result<(), IngestError> {
        self.working
            .leg_players
            .insert((row.leg_id, row.player_id), row);
        Ok(())
    }

    async fn find_turn(&mut self, external_id: &str) -> Result<Option<TurnRow>, IngestError> {
        Ok(self
            .working
            .turns
            .values()
            .find(|turn| turn.external_id == external_id)
            .cloned())
    }

    async fn insert_turn(&mut self, row: NewTurn) -> Result<TurnId, IngestError> {
        let id = next(&mut self.working.seq.turn);
        self.working.turns.insert(
            id,
            TurnRow {
                id,
                external_id: row.external_id,
                match_id: row.match_id,
                leg_id: row.leg_id,
                player_id: row.player_id,
                round_number: row.round_number,
                points: row.points,
                score: row.score,
                busted: row.busted,
                created_at: row.created_at,
                updated_at: row.created_at,
            },
        );
        Ok(id)
    }

    async fn update_turn(&mut self, row: &TurnRow) -> Result<(), IngestError> {
        let slot = self
            .working
            .turns
            .get_mut(&row.id)
            .ok_or(IngestError::NotFound("turn"))?;
        *slot = row.clone();
        Ok(())
    }

    async fn load_match_turns(&mut self, match_id: MatchId) -> Result<Vec<TurnRow>, IngestError> {
        let mut turns: Vec<TurnRow> = self
            .working
            .turns
            .values()
            .filter(|turn| turn.match_id == match_id)
            .cloned()
            .collect();
        turns.sort_by_key(|turn| (turn.leg_id, turn.round_number, turn.id));
        Ok(turns)
    }

    async fn load_slot(
        &mut self,
        turn_id: TurnId,
        dart_number: DartNumber,
    ) -> Result<Vec<DartThrowRow>, IngestError> {
        Ok(self
            .working
            .throws
            .values()
            .filter(|throw| throw.turn_id == turn_id && throw.dart_number == dart_number)
            .cloned()
            .collect())
    }

    async fn insert_throw(&mut self, row: NewDartThrow) -> Result<ThrowId, IngestError> {
        let id = next(&mut self.working.seq.throw);
        self.working.throws.insert(
            id,
            DartThrowRow {
                id,
                external_id: row.external_id,
                turn_id: row.turn_id,
                dart_number: row.dart_number,
                segment_number: row.segment_number,
                multiplier: row.multiplier,
                points: row.points,
                segment_name: row.segment_name,
                bed: row.bed,
                coord_x: row.coord_x,
                coord_y: row.coord_y,
                thrown_at: row.thrown_at,
                is_corrected: false,
                corrected_at: None,
                corrected_by: None,
            },
        );
        Ok(id)
    }

    async fn mark_corrected(
        &mut self,
        throw_id: ThrowId,
        corrected_at: DateTime<Utc>,
        corrected_by: ThrowId,
    ) -> Result<(), IngestError> {
        let throw = self
            .working
            .throws
            .get_mut(&throw_id)
            .ok_or(IngestError::NotFound("dart throw"))?;
        throw.is_corrected = true;
        throw.corrected_at = Some(corrected_at);
        throw.corrected_by = Some(corrected_by);
        Ok(())
    }

    async fn load_throws(
        &mut self,
        turn_ids: &[TurnId],
        include_corrected: bool,
    ) -> Result<Vec<DartThrowRow>, IngestError> {
        let mut throws: Vec<DartThrowRow> = self
            .working
            .throws
            .values()
            .filter(|throw| turn_ids.contains(&throw.turn_id))
            .filter(|throw| include_corrected || !throw.is_corrected)
            .cloned()
            .collect();
        throws.sort_by_key(|throw| (throw.turn_id, throw.dart_number, throw.id));
        Ok(throws)
    }

    async fn purge_match_state(&mut self, match_id: MatchId) -> Result<PurgeCounts, IngestError> {
        let tables = &mut self.working;
        let turn_ids: Vec<TurnId> = tables
            .turns
            .values()
            .filter(|turn| turn.match_id == match_id)
            .map(|turn| turn.id)
            .collect();

        let mut counts = PurgeCounts::default();

        let before = tables.throws.len();
        tables
            .throws
            .retain(|_, throw| !turn_ids.contains(&throw.turn_id));
        counts.throws = (before - tables.throws.len()) as u64;

        let before = tables.turns.len();
        tables.turns.retain(|_, turn| turn.match_id != match_id);
        counts.turns = (before - tables.turns.len()) as u64;

        let before = tables.leg_players.len();
        tables.leg_players.retain(|_, row| row.match_id != match_id);
        counts.leg_players = (before - tables.leg_players.len()) as u64;

        let before = tables.legs.len();
        tables.legs.retain(|_, leg| leg.match_id != match_id);
        counts.legs = (before - tables.legs.len()) as u64;

        let before = tables.match_players.len();
        tables.match_players.retain(|_, row| row.match_id != match_id);
        counts.match_players = (before - tables.match_players.len()) as u64;

        Ok(counts)
    }

    async fn reassign_match_player(
        &mut self,
        match_id: MatchId,
        from: PlayerId,
        to: PlayerId,
    ) -> Result<Vec<LegId>, IngestError> {
        let tables = &mut self.working;
        let mut moved = BTreeSet::new();
        for turn in tables
            .turns
            .values_mut()
            .filter(|turn| turn.match_id == match_id && turn.player_id == from)
        {
            turn.player_id = to;
            moved.insert(turn.leg_id);
        }
        for leg in tables
            .legs
            .values_mut()
            .filter(|leg| leg.match_id == match_id && leg.winner_player_id == Some(from))
        {
            leg.winner_player_id = Some(to);
            moved.insert(leg.id);
        }
        tables
            .leg_players
            .retain(|_, row| !(row.match_id == match_id && row.player_id == from));
        tables
            .match_players
            .retain(|_, row| !(row.match_id == match_id && row.player_id == from));
        Ok(moved.into_iter().collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), IngestError> {
        let InMemoryIngestTxn { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) {}
}
