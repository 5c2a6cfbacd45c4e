use std::sync::Arc;

use dashmap::DashMap;
use sea_orm::DatabaseConnection;
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, instrument, Span};

use crate::config::EngineConfig;

use super::error::IngestError;
use super::messages::WebhookEvent;
use super::reconcile::{apply_snapshot_turns, apply_throw_event};
use super::stats::{recompute, AffectedSet};
use super::storage::{
    IngestStorage, IngestStorageTxn, InMemoryIngestStorage, MatchRow, SeaOrmIngestStorage,
};
use super::sync::apply_snapshot;

const LOG_TARGET: &str = "darts_ledger::ledger::engine";

/// Per-match exclusive locks shared by live processing and rebuilds. An entry
/// lives only while some task holds or waits for it.
#[derive(Clone, Default)]
pub struct MatchLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl MatchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, match_id: &str) -> MatchLockGuard {
        let handle = self
            .inner
            .entry(match_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        MatchLockGuard {
            match_id: match_id.to_string(),
            guard: Some(handle.lock_owned().await),
            registry: Arc::clone(&self.inner),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Holds one match exclusively; dropping it prunes the registry entry when
/// nobody else is waiting.
pub struct MatchLockGuard {
    match_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl Drop for MatchLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold a clone of the Arc, so a count of one means the map's
        // own reference is the last.
        self.registry
            .remove_if(&self.match_id, |_, handle| Arc::strong_count(handle) == 1);
    }
}

/// What one delivery changed.
#[derive(Clone, Debug)]
pub struct ProcessOutcome {
    pub match_row: MatchRow,
    pub affected: AffectedSet,
}

/// Applies one parsed delivery inside an open unit of work. Live processing
/// and rebuilds both go through here.
pub async fn apply_event(
    txn: &mut (dyn IngestStorageTxn + Send),
    config: &EngineConfig,
    event: &WebhookEvent,
) -> Result<ProcessOutcome, IngestError> {
    let (match_row, affected) = match event {
        WebhookEvent::MatchState(state) => {
            let mut outcome = apply_snapshot(txn, state).await?;
            let from_turns = apply_snapshot_turns(txn, &mut outcome, state).await?;
            let mut affected = std::mem::take(&mut outcome.affected);
            affected.merge(from_turns);
            (outcome.match_row, affected)
        }
        WebhookEvent::Throw(throw) => apply_throw_event(txn, throw).await?,
    };
    recompute(txn, config, &match_row, &affected).await?;
    Ok(ProcessOutcome {
        match_row,
        affected,
    })
}

pub struct IngestEngine {
    storage: Arc<dyn IngestStorage>,
    config: EngineConfig,
    locks: MatchLocks,
}

impl IngestEngine {
    pub fn new(storage: Arc<dyn IngestStorage>, config: EngineConfig) -> Self {
        Self::with_locks(storage, config, MatchLocks::new())
    }

    pub fn with_locks(
        storage: Arc<dyn IngestStorage>,
        config: EngineConfig,
        locks: MatchLocks,
    ) -> Self {
        Self {
            storage,
            config,
            locks,
        }
    }

    pub fn from_sea_orm(connection: DatabaseConnection, config: EngineConfig) -> Self {
        let storage = Arc::new(SeaOrmIngestStorage::new(connection)) as Arc<dyn IngestStorage>;
        Self::new(storage, config)
    }

    pub fn in_memory(config: EngineConfig) -> Self {
        let storage = Arc::new(InMemoryIngestStorage::new()) as Arc<dyn IngestStorage>;
        Self::new(storage, config)
    }

    pub fn storage(&self) -> Arc<dyn IngestStorage> {
        Arc::clone(&self.storage)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn locks(&self) -> &MatchLocks {
        &self.locks
    }

    /// Parses a raw payload and processes it.
    pub async fn process_value(&self, payload: &JsonValue) -> Result<ProcessOutcome, IngestError> {
        let event = WebhookEvent::from_value(payload)?;
        self.process(&event).await
    }

    /// Applies one delivery atomically. Nothing is committed on failure.
    #[instrument(
        skip(self, event),
        level = "info",
        target = LOG_TARGET,
        fields(match_id = %event.match_id(), event = event.kind(), legs = tracing::field::Empty)
    )]
    pub async fn process(&self, event: &WebhookEvent) -> Result<ProcessOutcome, IngestError> {
        let _guard = self.locks.lock(event.match_id()).await;
        let mut txn = self.storage.begin().await?;
        let result = apply_event(txn.as_mut(), &self.config, event).await;
        match result {
            Ok(outcome) => {
                txn.commit().await?;
                Span::current().record("legs", outcome.affected.legs.len() as u64);
                debug!(
                    target: LOG_TARGET,
                    players = outcome.affected.players.len(),
                    "delivery committed"
                );
                Ok(outcome)
            }
            Err(err) => {
                txn.rollback().await;
                error!(target: LOG_TARGET, error = %err, "delivery rolled back");
                Err(err)
            }
        }
    }
}
