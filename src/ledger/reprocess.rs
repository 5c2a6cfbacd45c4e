//! Reprocessing Driver.
//!
//! Rebuilds one match from its webhook-call history: purge the derived rows,
//! reset the match status, then replay every recorded call in arrival order
//! through the same [`apply_event`] path live deliveries take. Purge and
//! replay share one unit of work and the match lock, so a failed rebuild
//! leaves the previous state in place.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;

use super::engine::{apply_event, IngestEngine, MatchLocks};
use super::error::IngestError;
use super::storage::{IngestStorage, IngestStorageTxn, PurgeCounts};
use super::store::{SharedCallLog, WebhookCall};
use super::types::CallId;

const LOG_TARGET: &str = "darts_ledger::ledger::reprocess";

#[derive(Debug, Error)]
pub enum ReprocessError {
    /// The call history could not be read.
    #[error("failed to load webhook calls: {0}")]
    CallLog(#[source] anyhow::Error),

    /// Neither a match row nor any recorded call exists for the id.
    #[error("match {0} not found")]
    MatchNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] IngestError),

    /// A historical call failed to parse or apply; the rebuild was rolled back.
    #[error("replay failed at webhook call {call_id}: {source}")]
    Replay {
        call_id: CallId,
        #[source]
        source: IngestError,
    },
}

impl ReprocessError {
    pub fn replay(call_id: CallId, source: IngestError) -> Self {
        Self::Replay { call_id, source }
    }
}

pub type ReprocessResult<T> = Result<T, ReprocessError>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReprocessSummary {
    pub match_id: String,
    pub purged: PurgeCounts,
    pub replayed: usize,
}

pub struct ReprocessDriver {
    storage: Arc<dyn IngestStorage>,
    calls: SharedCallLog,
    config: EngineConfig,
    locks: MatchLocks,
}

impl ReprocessDriver {
    pub fn new(
        storage: Arc<dyn IngestStorage>,
        calls: SharedCallLog,
        config: EngineConfig,
        locks: MatchLocks,
    ) -> Self {
        Self {
            storage,
            calls,
            config,
            locks,
        }
    }

    /// Shares the engine's storage and lock registry so live deliveries
    /// wait for a rebuild of the same match.
    pub fn for_engine(engine: &IngestEngine, calls: SharedCallLog) -> Self {
        Self::new(
            engine.storage(),
            calls,
            engine.config().clone(),
            engine.locks().clone(),
        )
    }

    #[instrument(skip(self), level = "info", target = LOG_TARGET)]
    pub async fn reprocess(&self, match_id: &str) -> ReprocessResult<ReprocessSummary> {
        // History is read under the lock so no delivery can commit between
        // the read and the purge.
        let _guard = self.locks.lock(match_id).await;
        let calls = self
            .calls
            .calls_for_match(match_id)
            .await
            .map_err(ReprocessError::CallLog)?;

        let mut txn = self.storage.begin().await?;
        let result = rebuild(txn.as_mut(), &self.config, match_id, &calls).await;

        match result {
            Ok(summary) => {
                txn.commit().await?;
                info!(
                    target: LOG_TARGET,
                    match_id,
                    replayed = summary.replayed,
                    purged_throws = summary.purged.throws,
                    purged_turns = summary.purged.turns,
                    "match rebuilt"
                );
                self.mark_replayed(&calls).await;
                Ok(summary)
            }
            Err(err) => {
                txn.rollback().await;
                match &err {
                    ReprocessError::Replay { call_id, source } => error!(
                        target: LOG_TARGET,
                        match_id,
                        call_id,
                        error = %source,
                        "rebuild rolled back at historical call"
                    ),
                    other => error!(target: LOG_TARGET, match_id, error = %other, "rebuild rolled back"),
                }
                Err(err)
            }
        }
    }

    /// Calls that failed live but replayed cleanly are now applied.
    async fn mark_replayed(&self, calls: &[WebhookCall]) {
        let now = Utc::now();
        for call in calls.iter().filter(|call| call.processed_at.is_none()) {
            if let Err(err) = self.calls.mark_processed(call.id, now).await {
                warn!(target: LOG_TARGET, call_id = call.id, error = %err, "failed to mark call processed");
            }
        }
    }
}

async fn rebuild(
    txn: &mut (dyn IngestStorageTxn + Send),
    config: &EngineConfig,
    match_id: &str,
    calls: &[WebhookCall],
) -> ReprocessResult<ReprocessSummary> {
    let purged = match txn.lock_match(match_id).await? {
        Some(mut row) => {
            let purged = txn.purge_match_state(row.id).await?;
            row.reset_status();
            txn.update_match(&row).await?;
            purged
        }
        None if calls.is_empty() => return Err(ReprocessError::MatchNotFound(match_id.to_string())),
        None => PurgeCounts::default(),
    };

    for call in calls {
        let event = call
            .parse()
            .map_err(|source| ReprocessError::replay(call.id, source))?;
        apply_event(txn, config, &event)
            .await
            .map_err(|source| ReprocessError::replay(call.id, source))?;
    }

    Ok(ReprocessSummary {
        match_id: match_id.to_string(),
        purged,
        replayed: calls.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::storage::InMemoryIngestStorage;
    use crate::ledger::store::{InMemoryWebhookCallLog, NewWebhookCall, WebhookCallLog};
    use crate::ledger::test_support::{
        fixture_time, FixtureThrow, FixtureTurn, SnapshotBuilder, ThrowBuilder,
    };
    use serde_json::Value as JsonValue;

    struct Harness {
        storage: Arc<InMemoryIngestStorage>,
        calls: Arc<InMemoryWebhookCallLog>,
        engine: IngestEngine,
        driver: Arc<ReprocessDriver>,
    }

    fn harness() -> Harness {
        let storage = Arc::new(InMemoryIngestStorage::new());
        let calls = Arc::new(InMemoryWebhookCallLog::new());
        let engine = IngestEngine::new(storage.clone(), EngineConfig::default());
        let driver = Arc::new(ReprocessDriver::for_engine(&engine, calls.clone()));
        Harness {
            storage,
            calls,
            engine,
            driver,
        }
    }

    impl Harness {
        /// Records then processes, the way the webhook endpoint does.
        async fn deliver(&self, payload: JsonValue, offset: i64) {
            let call = self
                .calls
                .record(NewWebhookCall::from_payload(payload, fixture_time(offset)))
                .await
                .unwrap();
            if self.engine.process_value(&call.payload).await.is_ok() {
                self.calls
                    .mark_processed(call.id, fixture_time(offset))
                    .await
                    .unwrap();
            }
        }

        /// Derived state with storage ids stripped out.
        async fn fingerprint(&self, external_id: &str) -> String {
            let mut txn = self.storage.begin().await.unwrap();
            let row = txn.find_match(external_id).await.unwrap().unwrap();
            let participants: Vec<JsonValue> = txn
                .load_match_players(row.id)
                .await
                .unwrap()
                .into_iter()
                .map(|p| {
                    serde_json::json!([p.player_id, p.player_index, p.legs_won, p.stats])
                })
                .collect();
            let legs = txn.load_legs(row.id).await.unwrap();
            let mut leg_rows = Vec::new();
            for leg in &legs {
                let players = txn.load_leg_players(leg.id).await.unwrap();
                let players: Vec<JsonValue> = players
                    .into_iter()
                    .map(|lp| serde_json::json!([lp.player_id, lp.won, lp.stats]))
                    .collect();
                leg_rows.push(serde_json::json!([
                    leg.set_number,
                    leg.leg_number,
                    leg.winner_player_id,
                    leg.finished_at,
                    players
                ]));
            }
            let turns = txn.load_match_turns(row.id).await.unwrap();
            let turn_ids: Vec<i64> = turns.iter().map(|t| t.id).collect();
            let throws: Vec<JsonValue> = txn
                .load_throws(&turn_ids, true)
                .await
                .unwrap()
                .into_iter()
                .map(|t| serde_json::json!([t.external_id, t.points, t.is_corrected, t.corrected_at]))
                .collect();
            let turns: Vec<JsonValue> = turns
                .into_iter()
                .map(|t| serde_json::json!([t.external_id, t.points, t.score, t.busted]))
                .collect();
            serde_json::json!({
                "match": [row.winner_player_id, row.finished_at, row.started_at, row.current_leg],
                "participants": participants,
                "legs": leg_rows,
                "turns": turns,
                "throws": throws,
            })
            .to_string()
        }
    }

    async fn play_short_match(h: &Harness) {
        h.deliver(SnapshotBuilder::new("m-1").to_json(), 0).await;
        h.deliver(
            ThrowBuilder::new("m-1", "t-1", "d-0").dart(0, 20, 3).score(441).to_json(),
            1,
        )
        .await;
        h.deliver(
            ThrowBuilder::new("m-1", "t-1", "d-1").dart(1, 20, 1).score(421).to_json(),
            2,
        )
        .await;
        h.deliver(
            ThrowBuilder::new("m-1", "t-1", "d-1b").dart(1, 20, 3).score(381).at(3).to_json(),
            3,
        )
        .await;
        h.deliver(
            SnapshotBuilder::new("m-1")
                .at(4)
                .turn(
                    FixtureTurn::new("t-2", "h-1", 1, 100, 401)
                        .throw(FixtureThrow::new("e-0", 0, 20, 3))
                        .throw(FixtureThrow::new("e-1", 1, 20, 1))
                        .throw(FixtureThrow::new("e-2", 2, 20, 1)),
                )
                .to_json(),
            4,
        )
        .await;
        h.deliver(
            SnapshotBuilder::new("m-1")
                .at(5)
                .leg(1, 2)
                .tallies(&[(1, 0), (0, 0)])
                .finished(Some(0))
                .to_json(),
            5,
        )
        .await;
    }

    #[tokio::test]
    async fn rebuild_matches_live_processing() {
        let h = harness();
        play_short_match(&h).await;
        let live = h.fingerprint("m-1").await;
        let counts = h.storage.table_counts().await;

        let summary = h.driver.reprocess("m-1").await.unwrap();
        assert_eq!(summary.replayed, 6);
        assert_eq!(summary.purged.turns, 2);
        assert_eq!(summary.purged.throws, 6);

        assert_eq!(h.fingerprint("m-1").await, live);
        assert_eq!(h.storage.table_counts().await, counts);
    }

    #[tokio::test]
    async fn unparsable_history_rolls_the_rebuild_back() {
        let h = harness();
        play_short_match(&h).await;
        let live = h.fingerprint("m-1").await;
        h.deliver(serde_json::json!({ "event": "throw", "matchId": "m-1" }), 6)
            .await;
        assert_eq!(h.calls.pending_calls(None).await.unwrap().len(), 1);

        let err = h.driver.reprocess("m-1").await.unwrap_err();
        let ReprocessError::Replay { call_id, .. } = err else {
            panic!("expected a replay error, got {err}");
        };
        assert_eq!(call_id, 7);
        assert_eq!(h.fingerprint("m-1").await, live);
    }

    #[tokio::test]
    async fn rebuild_reads_history_only_once_it_holds_the_match_lock() {
        let h = harness();
        h.deliver(SnapshotBuilder::new("m-1").to_json(), 0).await;

        // A live delivery holds the lock while the rebuild is requested.
        let guard = h.engine.locks().lock("m-1").await;
        let driver = Arc::clone(&h.driver);
        let rebuild = tokio::spawn(async move { driver.reprocess("m-1").await });
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert!(!rebuild.is_finished());

        let call = h
            .calls
            .record(NewWebhookCall::from_payload(
                ThrowBuilder::new("m-1", "t-1", "d-0").dart(0, 20, 3).at(1).to_json(),
                fixture_time(1),
            ))
            .await
            .unwrap();
        let event = call.parse().unwrap();
        let mut txn = h.storage.begin().await.unwrap();
        apply_event(txn.as_mut(), h.engine.config(), &event)
            .await
            .unwrap();
        txn.commit().await.unwrap();
        h.calls.mark_processed(call.id, fixture_time(1)).await.unwrap();
        drop(guard);

        let summary = rebuild.await.unwrap().unwrap();
        assert_eq!(summary.replayed, 2);

        let mut txn = h.storage.begin().await.unwrap();
        let turn = txn.find_turn("t-1").await.unwrap();
        assert_eq!(turn.map(|t| t.points), Some(60));
        drop(txn);
        assert!(h.calls.pending_calls(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_match_is_reported() {
        let h = harness();
        assert!(matches!(
            h.driver.reprocess("nope").await,
            Err(ReprocessError::MatchNotFound(_))
        ));
    }
}
