pub mod engine;
pub mod error;
pub mod identity;
pub mod messages;
mod operator;
pub mod query;
pub mod queue;
pub mod reconcile;
pub mod reprocess;
pub mod stats;
pub mod storage;
pub mod store;
pub mod sync;
pub mod types;
pub mod worker;

#[cfg(test)]
pub mod test_support;

pub use engine::{apply_event, IngestEngine, MatchLockGuard, MatchLocks, ProcessOutcome};
pub use error::IngestError;
pub use messages::{MatchStateEvent, ThrowEvent, WebhookEvent};
pub use operator::{DeliveryDispatcher, DispatchError, PendingReport};
pub use query::{MatchReport, MatchReportError, MatchReportQuery};
pub use queue::{Delivery, DeliveryQueue, DeliveryStatus, FifoDeliveryQueue, QueueError};
pub use reprocess::{ReprocessDriver, ReprocessError, ReprocessSummary};
pub use stats::{AffectedSet, PlayerStats};
pub use storage::{
    IngestStorage, IngestStorageTxn, InMemoryIngestStorage, PurgeCounts, SeaOrmIngestStorage,
};
pub use store::{
    InMemoryWebhookCallLog, NewWebhookCall, SeaOrmWebhookCallLog, SharedCallLog, WebhookCall,
    WebhookCallLog,
};
pub use types::{CallId, GameVariant, LegId, MatchId, OutMode, PlayerId, ThrowId, TurnId};
pub use worker::{DeliveryWorker, WorkerError};
