use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;

use super::engine::IngestEngine;
use super::queue::{Delivery, DeliveryQueue, DeliveryStatus, FifoDeliveryQueue, QueueError};
use super::store::{SharedCallLog, WebhookCall};
use super::worker::{DeliveryWorker, WorkerError};

const LOG_TARGET: &str = "darts_ledger::ledger::operator";

fn spawn_named_task<F, S>(name: S, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    S: Into<String>,
{
    let name_owned = name.into();
    #[cfg(tokio_unstable)]
    {
        tokio::task::Builder::new().name(&name_owned).spawn(future)
    }
    #[cfg(not(tokio_unstable))]
    {
        use tracing::Instrument;
        let span = tracing::info_span!("task", task_name = %name_owned);
        tokio::spawn(future.instrument(span))
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to load pending calls: {0}")]
    CallLog(#[source] anyhow::Error),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Totals for one `process_pending` run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PendingReport {
    pub dispatched: usize,
    pub processed: usize,
    pub failed: usize,
}

/// Routes recorded calls onto worker lanes. Every call for one match lands on
/// the same lane, so a match sees its deliveries in arrival order while other
/// matches proceed in parallel.
pub struct DeliveryDispatcher {
    lanes: Vec<Arc<FifoDeliveryQueue>>,
    workers: Vec<JoinHandle<Result<(), WorkerError>>>,
    calls: SharedCallLog,
}

impl DeliveryDispatcher {
    /// Spawns one worker per configured lane.
    pub fn start(engine: Arc<IngestEngine>, calls: SharedCallLog) -> Self {
        let config: &EngineConfig = engine.config();
        let lane_count = config.lanes.max(1);
        let capacity = config.queue_capacity;

        let mut lanes = Vec::with_capacity(lane_count);
        let mut workers = Vec::with_capacity(lane_count);
        for lane in 0..lane_count {
            let queue = Arc::new(FifoDeliveryQueue::new(capacity));
            let worker = DeliveryWorker::new(
                lane,
                queue.clone(),
                Arc::clone(&engine),
                Arc::clone(&calls),
            );
            let handle = spawn_named_task(format!("delivery-lane-{lane}"), async move {
                let result = worker.run().await;
                if let Err(err) = &result {
                    error!(target: LOG_TARGET, lane, "delivery worker exited with error: {err}");
                }
                result
            });
            lanes.push(queue);
            workers.push(handle);
        }
        info!(target: LOG_TARGET, lanes = lane_count, "delivery dispatcher started");

        Self {
            lanes,
            workers,
            calls,
        }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Calls without a match id share lane 0.
    pub fn lane_for(&self, match_id: Option<&str>) -> usize {
        match match_id {
            Some(match_id) => {
                let mut hasher = DefaultHasher::new();
                match_id.hash(&mut hasher);
                (hasher.finish() % self.lanes.len() as u64) as usize
            }
            None => 0,
        }
    }

    /// Enqueues one call; the receiver resolves once its lane has handled it.
    pub fn dispatch(
        &self,
        call: WebhookCall,
    ) -> Result<tokio::sync::oneshot::Receiver<DeliveryStatus>, DispatchError> {
        let lane = self.lane_for(call.match_id.as_deref());
        let (delivery, ack) = Delivery::with_ack(call);
        self.lanes[lane].push(delivery)?;
        Ok(ack)
    }

    /// Re-runs every unprocessed call, optionally for one match, in creation
    /// order, and waits for all of them.
    #[instrument(skip(self), level = "info", target = LOG_TARGET)]
    pub async fn process_pending(
        &self,
        match_id: Option<&str>,
    ) -> Result<PendingReport, DispatchError> {
        let pending = self
            .calls
            .pending_calls(match_id)
            .await
            .map_err(DispatchError::CallLog)?;
        info!(target: LOG_TARGET, pending = pending.len(), "dispatching pending calls");

        let mut acks = Vec::with_capacity(pending.len());
        for call in pending {
            acks.push(self.dispatch(call)?);
        }

        let mut report = PendingReport {
            dispatched: acks.len(),
            ..PendingReport::default()
        };
        for status in join_all(acks).await {
            match status {
                Ok(DeliveryStatus::Processed) => report.processed += 1,
                Ok(DeliveryStatus::Failed { .. }) => report.failed += 1,
                Err(_) => {
                    warn!(target: LOG_TARGET, "lane closed before acknowledging a delivery");
                    report.failed += 1;
                }
            }
        }
        info!(
            target: LOG_TARGET,
            processed = report.processed,
            failed = report.failed,
            "pending calls handled"
        );
        Ok(report)
    }

    /// Closes every lane and waits for the workers. Calls still queued are
    /// dropped and stay pending in the call log.
    pub async fn shutdown(self) {
        for lane in &self.lanes {
            lane.close();
        }
        for (lane, joined) in join_all(self.workers).await.into_iter().enumerate() {
            if let Err(err) = joined {
                error!(target: LOG_TARGET, lane, "delivery worker panicked: {err}");
            }
        }
        info!(target: LOG_TARGET, "delivery dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::storage::{IngestStorage, InMemoryIngestStorage};
    use crate::ledger::store::{InMemoryWebhookCallLog, NewWebhookCall, WebhookCallLog};
    use crate::ledger::test_support::{fixture_time, SnapshotBuilder, ThrowBuilder};

    fn setup(lanes: usize) -> (DeliveryDispatcher, Arc<InMemoryIngestStorage>, Arc<InMemoryWebhookCallLog>) {
        let storage = Arc::new(InMemoryIngestStorage::new());
        let calls = Arc::new(InMemoryWebhookCallLog::new());
        let engine = Arc::new(IngestEngine::new(
            storage.clone(),
            EngineConfig::default().with_lanes(lanes),
        ));
        let dispatcher = DeliveryDispatcher::start(engine, calls.clone());
        (dispatcher, storage, calls)
    }

    #[tokio::test]
    async fn one_match_always_maps_to_one_lane() {
        let (dispatcher, _, _) = setup(4);
        assert_eq!(dispatcher.lane_count(), 4);
        let lane = dispatcher.lane_for(Some("m-1"));
        for _ in 0..8 {
            assert_eq!(dispatcher.lane_for(Some("m-1")), lane);
        }
        assert_eq!(dispatcher.lane_for(None), 0);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn pending_calls_are_applied_in_arrival_order() {
        let (dispatcher, storage, calls) = setup(3);
        let payloads = [
            SnapshotBuilder::new("m-1").to_json(),
            ThrowBuilder::new("m-1", "t-1", "d-0").dart(0, 20, 3).to_json(),
            ThrowBuilder::new("m-1", "t-1", "d-0b").dart(0, 5, 1).at(1).to_json(),
            SnapshotBuilder::new("m-2").to_json(),
            serde_json::json!({ "event": "throw", "matchId": "m-2" }),
        ];
        for (offset, payload) in payloads.into_iter().enumerate() {
            calls
                .record(NewWebhookCall::from_payload(payload, fixture_time(offset as i64)))
                .await
                .unwrap();
        }

        let report = dispatcher.process_pending(None).await.unwrap();
        assert_eq!(
            report,
            PendingReport {
                dispatched: 5,
                processed: 4,
                failed: 1
            }
        );
        assert_eq!(calls.pending_calls(None).await.unwrap().len(), 1);

        {
            let mut txn = storage.begin().await.unwrap();
            let turn = txn.find_turn("t-1").await.unwrap().unwrap();
            assert_eq!(turn.points, 5);
            let slot = txn.load_slot(turn.id, 0).await.unwrap();
            assert_eq!(slot.len(), 2);
            assert!(slot[0].is_corrected);
        }

        let again = dispatcher.process_pending(Some("m-2")).await.unwrap();
        assert_eq!(again.dispatched, 1);
        assert_eq!(again.failed, 1);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_is_refused() {
        let (dispatcher, _, calls) = setup(1);
        let call = calls
            .record(NewWebhookCall::from_payload(
                SnapshotBuilder::new("m-1").to_json(),
                fixture_time(0),
            ))
            .await
            .unwrap();
        let lanes = dispatcher.lanes.clone();
        dispatcher.shutdown().await;
        assert!(matches!(
            lanes[0].push(Delivery::new(call)),
            Err(QueueError::Closed)
        ));
    }
}
