//! Turn/Throw Reconciler.
//!
//! Every `(turn, dart_number)` slot is an ordered list of versions, oldest
//! first. The last version is current; every earlier one is corrected and
//! points at its successor. [`ThrowSlot`] decides what a new delivery means
//! for a slot and checks that shape after each correction.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::error::IngestError;
use super::identity::{player_by_handle, resolve_player, HandleScope, PlayerDescriptor};
use super::messages::{MatchStateEvent, ThrowEvent, ThrowPayload, TurnPayload};
use super::stats::AffectedSet;
use super::storage::{
    DartThrowRow, IngestStorageTxn, LegRow, MatchPlayerRow, MatchRow, NewDartThrow, NewMatch,
    NewMatchPlayer, NewTurn, TurnRow,
};
use super::sync::{award_leg, ensure_leg, ensure_match, SnapshotOutcome};
use super::types::{DartNumber, GameVariant, PlayerId, ScoringKind, ThrowId, TurnId};

const LOG_TARGET: &str = "darts_ledger::ledger::reconcile";

/// Point value of one dart. Bulls are taken verbatim; a miss scores nothing.
pub fn segment_points(number: i32, multiplier: i32) -> i32 {
    match (number, multiplier) {
        (0, _) | (_, 0) => 0,
        (50, _) => 50,
        (25, m) if m >= 2 => 50,
        (25, _) => 25,
        (n, m) => n * m,
    }
}

/// What applying a delivery to a slot amounts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotAction {
    Insert,
    Duplicate,
    Correct { superseded: ThrowId },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThrowSlot {
    turn_id: TurnId,
    dart_number: DartNumber,
    versions: Vec<DartThrowRow>,
}

impl ThrowSlot {
    pub fn new(turn_id: TurnId, dart_number: DartNumber, mut versions: Vec<DartThrowRow>) -> Self {
        versions.sort_by_key(|version| version.id);
        Self {
            turn_id,
            dart_number,
            versions,
        }
    }

    pub fn current(&self) -> Option<&DartThrowRow> {
        self.versions.last()
    }

    pub fn versions(&self) -> &[DartThrowRow] {
        &self.versions
    }

    /// An id seen anywhere in the history is a redelivery, even if it has
    /// since been corrected away.
    pub fn plan(&self, external_id: &str) -> SlotAction {
        if self
            .versions
            .iter()
            .any(|version| version.external_id == external_id)
        {
            return SlotAction::Duplicate;
        }
        match self.current() {
            None => SlotAction::Insert,
            Some(current) => SlotAction::Correct {
                superseded: current.id,
            },
        }
    }

    pub fn verify(&self) -> Result<(), IngestError> {
        let Some((current, history)) = self.versions.split_last() else {
            return Ok(());
        };
        if current.is_corrected || current.corrected_by.is_some() {
            return Err(self.violation(format!("current throw {} is marked corrected", current.id)));
        }
        for (index, version) in history.iter().enumerate() {
            let successor = &self.versions[index + 1];
            if !version.is_corrected {
                return Err(self.violation(format!(
                    "throw {} is not the latest version but is still current",
                    version.id
                )));
            }
            if version.corrected_by != Some(successor.id) {
                return Err(self.violation(format!(
                    "throw {} links to {:?} instead of {}",
                    version.id, version.corrected_by, successor.id
                )));
            }
        }
        Ok(())
    }

    fn violation(&self, reason: String) -> IngestError {
        IngestError::invariant(self.turn_id, self.dart_number, reason)
    }
}

fn new_throw(turn_id: TurnId, payload: &ThrowPayload) -> NewDartThrow {
    let segment = &payload.segment;
    NewDartThrow {
        external_id: payload.id.clone(),
        turn_id,
        dart_number: payload.dart_number,
        segment_number: segment.number,
        multiplier: segment.multiplier,
        points: segment_points(segment.number, segment.multiplier),
        segment_name: segment.name.clone(),
        bed: segment.bed.clone(),
        coord_x: payload.coords.map(|coords| coords.x),
        coord_y: payload.coords.map(|coords| coords.y),
        thrown_at: payload.created_at,
    }
}

/// Applies one throw descriptor to its slot inside `turn`.
pub async fn reconcile_throw(
    txn: &mut (dyn IngestStorageTxn + Send),
    turn: &TurnRow,
    payload: &ThrowPayload,
    at: DateTime<Utc>,
) -> Result<SlotAction, IngestError> {
    let versions = txn.load_slot(turn.id, payload.dart_number).await?;
    let slot = ThrowSlot::new(turn.id, payload.dart_number, versions);
    let action = slot.plan(&payload.id);
    match action {
        SlotAction::Duplicate => {
            debug!(
                target: LOG_TARGET,
                turn_id = %turn.external_id,
                dart_number = payload.dart_number,
                throw_id = %payload.id,
                "duplicate throw delivery"
            );
        }
        SlotAction::Insert => {
            txn.insert_throw(new_throw(turn.id, payload)).await?;
        }
        SlotAction::Correct { superseded } => {
            let replacement = txn.insert_throw(new_throw(turn.id, payload)).await?;
            txn.mark_corrected(superseded, at, replacement).await?;
            info!(
                target: LOG_TARGET,
                turn_id = %turn.external_id,
                dart_number = payload.dart_number,
                superseded,
                replacement,
                throw_id = %payload.id,
                "throw corrected"
            );
            let versions = txn.load_slot(turn.id, payload.dart_number).await?;
            ThrowSlot::new(turn.id, payload.dart_number, versions).verify()?;
        }
    }
    Ok(action)
}

/// Fields a delivery asserts about a turn.
#[derive(Clone, Debug)]
struct TurnFacts<'a> {
    external_id: &'a str,
    leg: &'a LegRow,
    player_id: PlayerId,
    round_number: i32,
    /// `None` when the points are derived from the turn's throws.
    points: Option<i32>,
    score: i32,
    busted: bool,
    at: DateTime<Utc>,
}

async fn upsert_turn(
    txn: &mut (dyn IngestStorageTxn + Send),
    facts: TurnFacts<'_>,
    affected: &mut AffectedSet,
) -> Result<(TurnRow, bool), IngestError> {
    let Some(existing) = txn.find_turn(facts.external_id).await? else {
        let turn_id = txn
            .insert_turn(NewTurn {
                external_id: facts.external_id.to_string(),
                match_id: facts.leg.match_id,
                leg_id: facts.leg.id,
                player_id: facts.player_id,
                round_number: facts.round_number,
                points: facts.points.unwrap_or(0),
                score: facts.score,
                busted: facts.busted,
                created_at: facts.at,
            })
            .await?;
        let row = txn
            .find_turn(facts.external_id)
            .await?
            .filter(|row| row.id == turn_id)
            .ok_or(IngestError::NotFound("turn"))?;
        return Ok((row, true));
    };

    if existing.match_id != facts.leg.match_id {
        return Err(IngestError::validation(format!(
            "turn {} already belongs to another match",
            facts.external_id
        )));
    }
    if existing.leg_id != facts.leg.id || existing.player_id != facts.player_id {
        // The old pair loses the turn.
        affected.touch(existing.leg_id, existing.player_id);
    }
    let updated = TurnRow {
        leg_id: facts.leg.id,
        player_id: facts.player_id,
        round_number: facts.round_number,
        points: facts.points.unwrap_or(existing.points),
        score: facts.score,
        busted: facts.busted,
        ..existing.clone()
    };
    if updated == existing {
        return Ok((existing, false));
    }
    let updated = TurnRow {
        updated_at: facts.at,
        ..updated
    };
    txn.update_turn(&updated).await?;
    Ok((updated, true))
}

/// X01 legs end when a clean turn leaves the player on exactly zero.
async fn award_on_checkout(
    txn: &mut (dyn IngestStorageTxn + Send),
    variant: &GameVariant,
    leg: &mut LegRow,
    turn: &TurnRow,
    affected: &mut AffectedSet,
) -> Result<bool, IngestError> {
    if variant.scoring() != ScoringKind::Points {
        return Ok(false);
    }
    if turn.busted || turn.score != 0 || turn.points <= 0 {
        return Ok(false);
    }
    let awarded = award_leg(txn, leg, turn.player_id, turn.updated_at).await?;
    if awarded {
        affected.touch_leg(leg.id);
    }
    Ok(awarded)
}

/// Raises a participant's legs-won tally to the legs they are recorded as
/// winning. Snapshot tallies overwrite it on the next `match_state`.
async fn credit_checkout(
    txn: &mut (dyn IngestStorageTxn + Send),
    match_row: &MatchRow,
    player_id: PlayerId,
) -> Result<(), IngestError> {
    let won = txn
        .load_legs(match_row.id)
        .await?
        .iter()
        .filter(|leg| leg.winner_player_id == Some(player_id))
        .count();
    let won = i32::try_from(won).unwrap_or(i32::MAX);
    let participants = txn.load_match_players(match_row.id).await?;
    if let Some(participant) = participants
        .into_iter()
        .find(|participant| participant.player_id == player_id)
    {
        if participant.legs_won < won {
            debug!(
                target: LOG_TARGET,
                match_id = %match_row.external_id,
                player_id,
                legs_won = won,
                "legs won raised from checkout"
            );
            txn.update_match_player(&MatchPlayerRow {
                legs_won: won,
                ..participant
            })
            .await?;
        }
    }
    Ok(())
}

/// Looks a throw event's handle up in the match, registering an unknown one
/// as the next participant.
async fn participant_for_handle(
    txn: &mut (dyn IngestStorageTxn + Send),
    match_row: &MatchRow,
    handle: &str,
    player_name: Option<&str>,
    affected: &mut AffectedSet,
) -> Result<PlayerId, IngestError> {
    let scope = HandleScope {
        match_id: match_row.id,
        handle,
    };
    if let Some(player_id) = player_by_handle(txn, scope).await? {
        return Ok(player_id);
    }

    let participants = txn.load_match_players(match_row.id).await?;
    let seated: Vec<PlayerId> = participants
        .iter()
        .map(|participant| participant.player_id)
        .collect();
    let descriptor = PlayerDescriptor::anonymous(player_name.unwrap_or(handle));
    let resolved = resolve_player(txn, &descriptor, Some(scope), &seated).await?;
    warn!(
        target: LOG_TARGET,
        match_id = %match_row.external_id,
        handle,
        player_id = resolved.player_id,
        resolution = ?resolved.resolution,
        "throw references a handle no snapshot has introduced"
    );

    let player_index = participants
        .iter()
        .map(|participant| participant.player_index + 1)
        .max()
        .unwrap_or(0);
    txn.insert_match_player(NewMatchPlayer {
        match_id: match_row.id,
        player_id: resolved.player_id,
        player_index,
        handle: Some(handle.to_string()),
        legs_won: 0,
        sets_won: 0,
    })
    .await?;
    affected.players.insert(resolved.player_id);
    Ok(resolved.player_id)
}

/// Applies one incremental `throw` delivery.
pub async fn apply_throw_event(
    txn: &mut (dyn IngestStorageTxn + Send),
    event: &ThrowEvent,
) -> Result<(MatchRow, AffectedSet), IngestError> {
    let data = &event.data;
    let mut affected = AffectedSet::default();

    let (mut match_row, _) = ensure_match(txn, &event.match_id, || NewMatch {
        external_id: event.match_id.clone(),
        variant: GameVariant::default().as_str().to_string(),
        match_type: None,
        settings: Default::default(),
        started_at: Some(event.timestamp),
        updated_at: event.timestamp,
    })
    .await?;

    let stored = (
        match_row.current_set,
        match_row.current_leg,
        match_row.current_round,
    );
    let reported = (data.set, data.leg, data.round.max(1));
    let mut dirty = false;
    if match_row.started_at.is_none() {
        match_row.started_at = Some(event.timestamp);
        dirty = true;
    }
    if reported > stored {
        match_row.current_set = data.set;
        match_row.current_leg = data.leg;
        match_row.current_round = data.round.max(1);
        match_row.updated_at = Some(event.timestamp);
        dirty = true;
    }
    if dirty {
        txn.update_match(&match_row).await?;
    }

    let (mut leg, _) =
        ensure_leg(txn, match_row.id, data.set, data.leg, Some(event.timestamp)).await?;
    let player_id = participant_for_handle(
        txn,
        &match_row,
        &data.player_id,
        data.player_name.as_deref(),
        &mut affected,
    )
    .await?;

    // A redelivery must not rewind the turn to an older score.
    if let Some(turn) = txn.find_turn(&data.turn_id).await? {
        let versions = txn.load_slot(turn.id, data.throw.dart_number).await?;
        let slot = ThrowSlot::new(turn.id, data.throw.dart_number, versions);
        if slot.plan(&data.throw.id) == SlotAction::Duplicate {
            debug!(
                target: LOG_TARGET,
                turn_id = %data.turn_id,
                dart_number = data.throw.dart_number,
                throw_id = %data.throw.id,
                "duplicate throw delivery"
            );
            return Ok((match_row, affected));
        }
    }

    let (turn, _) = upsert_turn(
        txn,
        TurnFacts {
            external_id: &data.turn_id,
            leg: &leg,
            player_id,
            round_number: data.round,
            points: None,
            score: data.score,
            busted: data.busted.unwrap_or(false),
            at: event.timestamp,
        },
        &mut affected,
    )
    .await?;
    reconcile_throw(txn, &turn, &data.throw, event.timestamp).await?;

    let current = txn.load_throws(&[turn.id], false).await?;
    let points: i32 = current.iter().map(|throw| throw.points).sum();
    let turn = if points != turn.points {
        let updated = TurnRow {
            points,
            updated_at: event.timestamp,
            ..turn
        };
        txn.update_turn(&updated).await?;
        updated
    } else {
        turn
    };

    if award_on_checkout(txn, &match_row.game_variant(), &mut leg, &turn, &mut affected).await? {
        credit_checkout(txn, &match_row, turn.player_id).await?;
    }
    affected.touch(leg.id, player_id);
    Ok((match_row, affected))
}

/// Applies the turns embedded in a snapshot the synchronizer just applied.
/// Snapshot turns carry their points verbatim.
pub async fn apply_snapshot_turns(
    txn: &mut (dyn IngestStorageTxn + Send),
    outcome: &mut SnapshotOutcome,
    event: &MatchStateEvent,
) -> Result<AffectedSet, IngestError> {
    let mut affected = AffectedSet::default();

    for turn_payload in &event.data.match_state.turns {
        let player_id = match outcome.player_for_handle(&turn_payload.player_id) {
            Some(player_id) => player_id,
            None => {
                participant_for_handle(
                    txn,
                    &outcome.match_row,
                    &turn_payload.player_id,
                    None,
                    &mut affected,
                )
                .await?
            }
        };
        let changed =
            apply_snapshot_turn(txn, outcome, turn_payload, player_id, event.timestamp, &mut affected)
                .await?;
        if changed {
            affected.touch(outcome.current_leg.id, player_id);
        }
    }

    Ok(affected)
}

async fn apply_snapshot_turn(
    txn: &mut (dyn IngestStorageTxn + Send),
    outcome: &mut SnapshotOutcome,
    payload: &TurnPayload,
    player_id: PlayerId,
    at: DateTime<Utc>,
    affected: &mut AffectedSet,
) -> Result<bool, IngestError> {
    let (turn, mut changed) = upsert_turn(
        txn,
        TurnFacts {
            external_id: &payload.id,
            leg: &outcome.current_leg,
            player_id,
            round_number: payload.round,
            points: Some(payload.points),
            score: payload.score,
            busted: payload.busted,
            at,
        },
        affected,
    )
    .await?;

    for throw in &payload.throws {
        if reconcile_throw(txn, &turn, throw, at).await? != SlotAction::Duplicate {
            changed = true;
        }
    }

    let variant = outcome.match_row.game_variant();
    award_on_checkout(txn, &variant, &mut outcome.current_leg, &turn, affected).await?;
    Ok(changed)
}
