//! Match State Synchronizer.
//!
//! Applies a full `match_state` snapshot: the match row and its settings, the
//! ordered participant list with tallies, leg rows for the current counters,
//! and the finished/winner status. Must run before the turns embedded in the
//! same snapshot are reconciled.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use super::error::IngestError;
use super::identity::{resolve_player, HandleScope, PlayerDescriptor};
use super::messages::{MatchSettingsPayload, MatchStateEvent};
use super::stats::AffectedSet;
use super::storage::{
    IngestStorageTxn, LegRow, MatchPlayerRow, MatchRow, MatchSettings, NewLeg, NewMatch,
    NewMatchPlayer,
};
use super::types::{GameVariant, PlayerId};

const LOG_TARGET: &str = "darts_ledger::ledger::sync";

/// State established by a snapshot that its embedded turns rely on.
#[derive(Clone, Debug)]
pub struct SnapshotOutcome {
    pub match_row: MatchRow,
    /// Ordered by `player_index`.
    pub participants: Vec<MatchPlayerRow>,
    pub current_leg: LegRow,
    pub affected: AffectedSet,
}

impl SnapshotOutcome {
    pub fn player_for_handle(&self, handle: &str) -> Option<PlayerId> {
        self.participants
            .iter()
            .find(|participant| participant.handle.as_deref() == Some(handle))
            .map(|participant| participant.player_id)
    }
}

impl From<&MatchSettingsPayload> for MatchSettings {
    fn from(payload: &MatchSettingsPayload) -> Self {
        Self {
            base_score: payload.base_score,
            in_mode: payload.in_mode.clone(),
            out_mode: payload.out_mode.clone(),
            bull_mode: payload.bull_mode.clone(),
            max_rounds: payload.max_rounds,
            match_mode_type: payload.match_mode_type.clone(),
            match_mode_legs: payload.match_mode_legs_count,
            match_mode_sets: payload.match_mode_sets_count,
            extra: JsonValue::Object(payload.extra.clone()),
        }
    }
}

/// Locks the match row, creating it first when the id is new.
pub async fn ensure_match(
    txn: &mut (dyn IngestStorageTxn + Send),
    external_id: &str,
    seed: impl FnOnce() -> NewMatch,
) -> Result<(MatchRow, bool), IngestError> {
    if let Some(row) = txn.lock_match(external_id).await? {
        return Ok((row, false));
    }
    let match_id = txn.insert_match(seed()).await?;
    info!(target: LOG_TARGET, match_id = %external_id, id = match_id, "created match");
    let row = txn
        .lock_match(external_id)
        .await?
        .ok_or(IngestError::NotFound("match"))?;
    Ok((row, true))
}

pub async fn ensure_leg(
    txn: &mut (dyn IngestStorageTxn + Send),
    match_id: i64,
    set_number: i32,
    leg_number: i32,
    started_at: Option<DateTime<Utc>>,
) -> Result<(LegRow, bool), IngestError> {
    if let Some(leg) = txn.find_leg(match_id, set_number, leg_number).await? {
        return Ok((leg, false));
    }
    let leg_id = txn
        .insert_leg(NewLeg {
            match_id,
            set_number,
            leg_number,
            started_at,
        })
        .await?;
    debug!(target: LOG_TARGET, match_id, set_number, leg_number, leg_id, "created leg");
    let leg = txn
        .load_leg(leg_id)
        .await?
        .ok_or(IngestError::NotFound("leg"))?;
    Ok((leg, true))
}

/// Gives `winner` the leg if it has none yet. Winners are never overwritten.
pub async fn award_leg(
    txn: &mut (dyn IngestStorageTxn + Send),
    leg: &mut LegRow,
    winner: PlayerId,
    at: DateTime<Utc>,
) -> Result<bool, IngestError> {
    if leg.winner_player_id.is_some() {
        return Ok(false);
    }
    leg.winner_player_id = Some(winner);
    leg.finished_at = Some(at);
    txn.update_leg(leg).await?;
    info!(
        target: LOG_TARGET,
        leg_id = leg.id,
        set_number = leg.set_number,
        leg_number = leg.leg_number,
        winner,
        "leg won"
    );
    Ok(true)
}

/// A throw can seat a handle before any snapshot names it, under a player
/// with no user id. Once a snapshot ties that handle to a user id, the
/// placeholder takes the user id, or hands its rows to the player already
/// holding it.
async fn adopt_placeholder(
    txn: &mut (dyn IngestStorageTxn + Send),
    match_row: &MatchRow,
    handle: &str,
    descriptor: &PlayerDescriptor,
    previous: &mut Vec<MatchPlayerRow>,
    affected: &mut AffectedSet,
) -> Result<(), IngestError> {
    let Some(user_id) = descriptor.user_id() else {
        return Ok(());
    };
    let Some(position) = previous
        .iter()
        .position(|row| row.handle.as_deref() == Some(handle))
    else {
        return Ok(());
    };
    let placeholder_id = previous[position].player_id;
    let Some(mut placeholder) = txn.load_player(placeholder_id).await? else {
        return Ok(());
    };
    if placeholder.user_id.is_some() {
        return Ok(());
    }

    match txn.find_player_by_user_id(user_id).await? {
        None => {
            info!(
                target: LOG_TARGET,
                match_id = %match_row.external_id,
                handle,
                player_id = placeholder_id,
                user_id,
                "placeholder participant identified"
            );
            placeholder.user_id = Some(user_id.to_string());
            txn.update_player(&placeholder).await?;
        }
        Some(known) => {
            info!(
                target: LOG_TARGET,
                match_id = %match_row.external_id,
                handle,
                from = placeholder_id,
                to = known.id,
                "placeholder participant merged into known player"
            );
            let legs = txn
                .reassign_match_player(match_row.id, placeholder_id, known.id)
                .await?;
            previous.remove(position);
            for leg_id in legs {
                affected.touch_leg(leg_id);
            }
            affected.players.insert(known.id);
        }
    }
    Ok(())
}

pub async fn apply_snapshot(
    txn: &mut (dyn IngestStorageTxn + Send),
    event: &MatchStateEvent,
) -> Result<SnapshotOutcome, IngestError> {
    let body = &event.data.match_state;
    let variant = event
        .variant_name()
        .map(GameVariant::parse)
        .unwrap_or_default();
    let settings = MatchSettings::from(&body.settings);

    let (mut match_row, _) = ensure_match(txn, &event.match_id, || NewMatch {
        external_id: event.match_id.clone(),
        variant: variant.as_str().to_string(),
        match_type: body.match_type.clone(),
        settings: settings.clone(),
        started_at: body.created_at.or(Some(event.timestamp)),
        updated_at: event.timestamp,
    })
    .await?;
    let mut affected = AffectedSet::default();
    let previous_counters = (match_row.current_set, match_row.current_leg);
    let mut previous = txn.load_match_players(match_row.id).await?;

    let mut roster: Vec<MatchPlayerRow> = Vec::with_capacity(body.players.len());
    let mut tally_winners: Vec<PlayerId> = Vec::new();
    for (index, payload) in body.players.iter().enumerate() {
        let player_index = i32::try_from(index)
            .map_err(|_| IngestError::validation("participant list too long"))?;
        let descriptor = PlayerDescriptor::from(payload);
        if let Some(handle) = payload.id.as_deref() {
            adopt_placeholder(txn, &match_row, handle, &descriptor, &mut previous, &mut affected)
                .await?;
        }
        let scope = payload.id.as_deref().map(|handle| HandleScope {
            match_id: match_row.id,
            handle,
        });
        // Seats already taken in this roster, or held under another handle.
        let seated: Vec<PlayerId> = roster
            .iter()
            .chain(previous.iter().filter(|row| {
                row.handle.is_some() && row.handle.as_deref() != payload.id.as_deref()
            }))
            .map(|row| row.player_id)
            .collect();
        let resolved = resolve_player(txn, &descriptor, scope, &seated).await?;
        let tally = body.scores.get(index).copied();

        let existing = previous
            .iter()
            .find(|row| row.player_id == resolved.player_id)
            .cloned();
        let row = match existing {
            Some(mut row) => {
                if let Some(tally) = tally {
                    if tally.sets > row.sets_won
                        || (tally.sets == row.sets_won && tally.legs > row.legs_won)
                    {
                        tally_winners.push(row.player_id);
                    }
                }
                let updated = MatchPlayerRow {
                    player_index,
                    handle: payload.id.clone().or(row.handle.clone()),
                    legs_won: tally.map(|t| t.legs).unwrap_or(row.legs_won),
                    sets_won: tally.map(|t| t.sets).unwrap_or(row.sets_won),
                    ..row.clone()
                };
                if updated != row {
                    txn.update_match_player(&updated).await?;
                    row = updated;
                }
                row
            }
            None => {
                txn.insert_match_player(NewMatchPlayer {
                    match_id: match_row.id,
                    player_id: resolved.player_id,
                    player_index,
                    handle: payload.id.clone(),
                    legs_won: tally.map(|t| t.legs).unwrap_or(0),
                    sets_won: tally.map(|t| t.sets).unwrap_or(0),
                })
                .await?;
                affected.players.insert(resolved.player_id);
                txn.load_match_players(match_row.id)
                    .await?
                    .into_iter()
                    .find(|row| row.player_id == resolved.player_id)
                    .ok_or(IngestError::NotFound("match player"))?
            }
        };
        roster.push(row);
    }

    // Participants missing from this roster keep their rows, ordered after it.
    let mut next_index = i32::try_from(roster.len()).unwrap_or(i32::MAX);
    for row in previous {
        if roster.iter().any(|kept| kept.player_id == row.player_id) {
            continue;
        }
        if row.player_index != next_index {
            let moved = MatchPlayerRow {
                player_index: next_index,
                ..row
            };
            txn.update_match_player(&moved).await?;
        }
        next_index = next_index.saturating_add(1);
    }

    for leg_number in 1..=body.leg {
        let started_at = (leg_number == body.leg).then_some(event.timestamp);
        let (leg, created) =
            ensure_leg(txn, match_row.id, body.set, leg_number, started_at).await?;
        if created && leg_number == body.leg {
            affected.touch_leg(leg.id);
        }
    }

    if !tally_winners.is_empty() {
        let mut legs = txn.load_legs(match_row.id).await?;
        for winner in tally_winners {
            let target = legs
                .iter_mut()
                .filter(|leg| {
                    leg.winner_player_id.is_none()
                        && (leg.set_number, leg.leg_number) <= previous_counters
                })
                .max_by_key(|leg| (leg.set_number, leg.leg_number));
            match target {
                Some(leg) => {
                    if award_leg(txn, leg, winner, event.timestamp).await? {
                        affected.touch_leg(leg.id);
                    }
                }
                None => debug!(
                    target: LOG_TARGET,
                    match_id = %event.match_id,
                    winner,
                    "tally increased but no open leg to attribute"
                ),
            }
        }
    }

    let (mut current_leg, _) = ensure_leg(txn, match_row.id, body.set, body.leg, None).await?;

    match_row.variant = variant.as_str().to_string();
    match_row.match_type = body.match_type.clone().or(match_row.match_type.take());
    match_row.settings = settings;
    match_row.current_set = body.set;
    match_row.current_leg = body.leg;
    match_row.current_round = body.round.max(1);
    if match_row.started_at.is_none() {
        match_row.started_at = body.created_at.or(Some(event.timestamp));
    }
    match_row.updated_at = Some(event.timestamp);

    if body.finished {
        let winner = body
            .winner_index()
            .and_then(|index| roster.get(index))
            .map(|row| row.player_id);
        match winner {
            Some(winner) => {
                if match_row.winner_player_id != Some(winner) || match_row.finished_at.is_none() {
                    info!(target: LOG_TARGET, match_id = %event.match_id, winner, "match finished");
                }
                match_row.winner_player_id = Some(winner);
                match_row.finished_at = match_row.finished_at.or(Some(event.timestamp));
                if award_leg(txn, &mut current_leg, winner, event.timestamp).await? {
                    affected.touch_leg(current_leg.id);
                }
            }
            None => {
                warn!(
                    target: LOG_TARGET,
                    match_id = %event.match_id,
                    winner = ?body.winner,
                    participants = roster.len(),
                    "finished snapshot without a resolvable winner"
                );
                match_row.winner_player_id = None;
                match_row.finished_at = None;
            }
        }
    } else {
        match_row.winner_player_id = None;
        match_row.finished_at = None;
    }
    txn.update_match(&match_row).await?;

    Ok(SnapshotOutcome {
        match_row,
        participants: roster,
        current_leg,
        affected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::messages::WebhookEvent;
    use crate::ledger::storage::{IngestStorage, InMemoryIngestStorage};
    use crate::ledger::test_support::{snapshot, SnapshotBuilder};

    fn state(builder: SnapshotBuilder) -> MatchStateEvent {
        match snapshot(builder) {
            WebhookEvent::MatchState(event) => event,
            WebhookEvent::Throw(_) => unreachable!(),
        }
    }

    #[tokio::test]
    async fn first_snapshot_creates_match_players_and_legs() {
        let storage = InMemoryIngestStorage::new();
        let mut txn = storage.begin().await.unwrap();
        let event = state(SnapshotBuilder::new("m-1").leg(1, 2));

        let outcome = apply_snapshot(txn.as_mut(), &event).await.unwrap();
        assert_eq!(outcome.participants.len(), 2);
        assert_eq!(outcome.participants[0].player_index, 0);
        assert_eq!(outcome.participants[1].handle.as_deref(), Some("h-1"));
        assert_eq!(outcome.match_row.settings.base_score, Some(501));
        assert_eq!(outcome.match_row.winner_player_id, None);

        let legs = txn.load_legs(outcome.match_row.id).await.unwrap();
        let numbers: Vec<(i32, i32)> = legs.iter().map(|l| (l.set_number, l.leg_number)).collect();
        assert_eq!(numbers, vec![(1, 1), (1, 2)]);
        assert!(legs.iter().all(|leg| leg.winner_player_id.is_none()));
    }

    #[tokio::test]
    async fn reapplying_a_snapshot_changes_nothing_but_bookkeeping() {
        let storage = InMemoryIngestStorage::new();
        let mut txn = storage.begin().await.unwrap();
        let event = state(SnapshotBuilder::new("m-1"));

        let first = apply_snapshot(txn.as_mut(), &event).await.unwrap();
        let second = apply_snapshot(txn.as_mut(), &event).await.unwrap();
        assert_eq!(first.match_row, second.match_row);
        assert_eq!(first.participants, second.participants);
        assert!(second.affected.is_empty());
    }

    #[tokio::test]
    async fn finished_snapshot_resolves_winner_by_index() {
        let storage = InMemoryIngestStorage::new();
        let mut txn = storage.begin().await.unwrap();
        let event = state(SnapshotBuilder::new("m-1").finished(Some(1)));

        let outcome = apply_snapshot(txn.as_mut(), &event).await.unwrap();
        let expected = outcome.participants[1].player_id;
        assert_eq!(outcome.match_row.winner_player_id, Some(expected));
        assert!(outcome.match_row.finished_at.is_some());
        assert_eq!(outcome.current_leg.winner_player_id, Some(expected));

        let reopened = state(SnapshotBuilder::new("m-1"));
        let outcome = apply_snapshot(txn.as_mut(), &reopened).await.unwrap();
        assert_eq!(outcome.match_row.winner_player_id, None);
        assert_eq!(outcome.match_row.finished_at, None);
        // Leg winners survive.
        assert_eq!(outcome.current_leg.winner_player_id, Some(expected));
    }

    #[tokio::test]
    async fn invalid_winner_index_leaves_status_unset() {
        let storage = InMemoryIngestStorage::new();
        let mut txn = storage.begin().await.unwrap();
        let event = state(SnapshotBuilder::new("m-1").finished(Some(7)));

        let outcome = apply_snapshot(txn.as_mut(), &event).await.unwrap();
        assert_eq!(outcome.match_row.winner_player_id, None);
        assert_eq!(outcome.match_row.finished_at, None);
    }

    #[tokio::test]
    async fn tally_increase_awards_the_previous_leg() {
        let storage = InMemoryIngestStorage::new();
        let mut txn = storage.begin().await.unwrap();
        apply_snapshot(txn.as_mut(), &state(SnapshotBuilder::new("m-1")))
            .await
            .unwrap();

        let next = state(SnapshotBuilder::new("m-1").leg(1, 2).tallies(&[(0, 0), (1, 0)]));
        let outcome = apply_snapshot(txn.as_mut(), &next).await.unwrap();
        let legs = txn.load_legs(outcome.match_row.id).await.unwrap();
        assert_eq!(legs[0].winner_player_id, Some(outcome.participants[1].player_id));
        assert_eq!(legs[1].winner_player_id, None);
        assert_eq!(outcome.participants[1].legs_won, 1);
        assert!(outcome.affected.legs.contains(&legs[0].id));
    }
}
