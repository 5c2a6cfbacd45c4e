use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::ledger::error::IngestError;
use crate::ledger::stats::PlayerStats;
use crate::ledger::storage::{DartThrowRow, IngestStorage, IngestStorageTxn, MatchSettings, TurnRow};
use crate::ledger::types::{LegId, PlayerId, TurnId};

/// Read side of the ingested graph for one match.
#[derive(Clone)]
pub struct MatchReportQuery {
    storage: Arc<dyn IngestStorage>,
}

impl MatchReportQuery {
    pub fn new(storage: Arc<dyn IngestStorage>) -> Self {
        Self { storage }
    }

    pub async fn execute(&self, external_id: &str) -> Result<MatchReport, MatchReportError> {
        let mut txn = self.storage.begin().await?;
        let result = load_report(txn.as_mut(), external_id).await;
        // Read-only: nothing to commit.
        txn.rollback().await;
        result
    }
}

async fn load_report(
    txn: &mut (dyn IngestStorageTxn + Send),
    external_id: &str,
) -> Result<MatchReport, MatchReportError> {
    let row = txn
        .find_match(external_id)
        .await?
        .ok_or_else(|| MatchReportError::MatchNotFound {
            match_id: external_id.to_string(),
        })?;

    let mut players = Vec::new();
    for participant in txn.load_match_players(row.id).await? {
        let name = txn
            .load_player(participant.player_id)
            .await?
            .map(|player| player.name)
            .unwrap_or_default();
        players.push(ReportPlayer {
            player_id: participant.player_id,
            index: participant.player_index,
            name,
            handle: participant.handle,
            legs_won: participant.legs_won,
            sets_won: participant.sets_won,
            stats: participant.stats,
        });
    }

    let turns = txn.load_match_turns(row.id).await?;
    let turn_ids: Vec<TurnId> = turns.iter().map(|turn| turn.id).collect();
    let mut throws_by_turn: BTreeMap<TurnId, Vec<DartThrowRow>> = BTreeMap::new();
    for throw in txn.load_throws(&turn_ids, true).await? {
        throws_by_turn.entry(throw.turn_id).or_default().push(throw);
    }
    let mut turns_by_leg: BTreeMap<LegId, Vec<ReportTurn>> = BTreeMap::new();
    for turn in turns {
        let throws = throws_by_turn.remove(&turn.id).unwrap_or_default();
        turns_by_leg
            .entry(turn.leg_id)
            .or_default()
            .push(ReportTurn::new(turn, throws));
    }

    let mut legs = Vec::new();
    for leg in txn.load_legs(row.id).await? {
        let players = txn
            .load_leg_players(leg.id)
            .await?
            .into_iter()
            .map(|lp| ReportLegPlayer {
                player_id: lp.player_id,
                won: lp.won,
                stats: lp.stats,
            })
            .collect();
        legs.push(ReportLeg {
            set_number: leg.set_number,
            leg_number: leg.leg_number,
            winner_player_id: leg.winner_player_id,
            started_at: leg.started_at,
            finished_at: leg.finished_at,
            players,
            turns: turns_by_leg.remove(&leg.id).unwrap_or_default(),
        });
    }

    Ok(MatchReport {
        match_id: row.external_id,
        variant: row.variant,
        match_type: row.match_type,
        settings: row.settings,
        winner_player_id: row.winner_player_id,
        current_set: row.current_set,
        current_leg: row.current_leg,
        current_round: row.current_round,
        started_at: row.started_at,
        finished_at: row.finished_at,
        players,
        legs,
    })
}

#[derive(Debug, Error)]
pub enum MatchReportError {
    #[error("match {match_id} not found")]
    MatchNotFound { match_id: String },
    #[error(transparent)]
    Storage(#[from] IngestError),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchReport {
    pub match_id: String,
    pub variant: String,
    pub match_type: Option<String>,
    pub settings: MatchSettings,
    pub winner_player_id: Option<PlayerId>,
    pub current_set: i32,
    pub current_leg: i32,
    pub current_round: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub players: Vec<ReportPlayer>,
    pub legs: Vec<ReportLeg>,
}

impl MatchReport {
    pub fn player(&self, player_id: PlayerId) -> Option<&ReportPlayer> {
        self.players.iter().find(|p| p.player_id == player_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportPlayer {
    pub player_id: PlayerId,
    pub index: i32,
    pub name: String,
    pub handle: Option<String>,
    pub legs_won: i32,
    pub sets_won: i32,
    pub stats: PlayerStats,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportLeg {
    pub set_number: i32,
    pub leg_number: i32,
    pub winner_player_id: Option<PlayerId>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub players: Vec<ReportLegPlayer>,
    pub turns: Vec<ReportTurn>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportLegPlayer {
    pub player_id: PlayerId,
    pub won: bool,
    pub stats: PlayerStats,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportTurn {
    pub turn_id: String,
    pub player_id: PlayerId,
    pub round_number: i32,
    pub points: i32,
    pub score: i32,
    pub busted: bool,
    /// Current version of each dart slot.
    pub throws: Vec<DartThrowRow>,
    /// Superseded versions, oldest first within each slot.
    pub corrected: Vec<DartThrowRow>,
}

impl ReportTurn {
    fn new(turn: TurnRow, throws: Vec<DartThrowRow>) -> Self {
        let (corrected, throws) = throws.into_iter().partition(|t| t.is_corrected);
        Self {
            turn_id: turn.external_id,
            player_id: turn.player_id,
            round_number: turn.round_number,
            points: turn.points,
            score: turn.score,
            busted: turn.busted,
            throws,
            corrected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ledger::engine::IngestEngine;
    use crate::ledger::test_support::{snapshot, throw, SnapshotBuilder, ThrowBuilder};

    #[tokio::test]
    async fn report_nests_turns_and_corrections_under_legs() {
        let engine = IngestEngine::in_memory(EngineConfig::default());
        engine
            .process(&snapshot(SnapshotBuilder::new("m-1")))
            .await
            .unwrap();
        engine
            .process(&throw(ThrowBuilder::new("m-1", "t-1", "d-0").dart(0, 20, 3)))
            .await
            .unwrap();
        engine
            .process(&throw(
                ThrowBuilder::new("m-1", "t-1", "d-0b").dart(0, 20, 1).at(1),
            ))
            .await
            .unwrap();

        let report = MatchReportQuery::new(engine.storage())
            .execute("m-1")
            .await
            .unwrap();
        assert_eq!(report.players.len(), 2);
        assert_eq!(report.players[0].name, "Alice");
        assert_eq!(report.legs.len(), 1);

        let turn = &report.legs[0].turns[0];
        assert_eq!(turn.turn_id, "t-1");
        assert_eq!(turn.points, 20);
        assert_eq!(turn.throws.len(), 1);
        assert_eq!(turn.throws[0].external_id, "d-0b");
        assert_eq!(turn.corrected.len(), 1);
        assert_eq!(turn.corrected[0].corrected_by, Some(turn.throws[0].id));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["legs"][0]["turns"][0]["corrected"][0]["points"], 60);
    }

    #[tokio::test]
    async fn unknown_match_is_reported() {
        let engine = IngestEngine::in_memory(EngineConfig::default());
        let err = MatchReportQuery::new(engine.storage())
            .execute("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, MatchReportError::MatchNotFound { .. }));
    }
}
