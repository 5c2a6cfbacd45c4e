use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::engine::{IngestEngine, ProcessOutcome};
use super::error::IngestError;
use super::queue::{Delivery, DeliveryQueue, DeliveryStatus};
use super::store::{SharedCallLog, WebhookCall};
use super::types::CallId;

const LOG_TARGET: &str = "darts_ledger::ledger::worker";

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("delivery {call_id} failed: {source}")]
    Ingest {
        call_id: CallId,
        #[source]
        source: IngestError,
    },
    #[error("call log error: {0}")]
    CallLog(#[source] anyhow::Error),
}

/// Drains one lane: every call popped is processed, then marked processed.
pub struct DeliveryWorker {
    lane: usize,
    queue: Arc<dyn DeliveryQueue>,
    engine: Arc<IngestEngine>,
    calls: SharedCallLog,
}

impl DeliveryWorker {
    pub fn new(
        lane: usize,
        queue: Arc<dyn DeliveryQueue>,
        engine: Arc<IngestEngine>,
        calls: SharedCallLog,
    ) -> Self {
        Self {
            lane,
            queue,
            engine,
            calls,
        }
    }

    pub fn lane(&self) -> usize {
        self.lane
    }

    /// Runs until the lane's queue is closed. Failed deliveries are logged and
    /// left unprocessed; they never stop the lane.
    pub async fn run(&self) -> Result<(), WorkerError> {
        info!(target: LOG_TARGET, lane = self.lane, "delivery worker started");
        while let Ok(delivery) = self.queue.pop().await {
            self.handle_delivery(delivery).await;
        }
        info!(target: LOG_TARGET, lane = self.lane, "delivery queue closed; worker exiting");
        Ok(())
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let status = match self.handle_call(&delivery.call).await {
            Ok(_) => DeliveryStatus::Processed,
            Err(err) => {
                let call = &delivery.call;
                error!(
                    target: LOG_TARGET,
                    lane = self.lane,
                    call_id = call.id,
                    match_id = ?call.match_id,
                    event = %call.event,
                    created_at = %call.created_at,
                    error = %err,
                    "delivery left unprocessed"
                );
                debug!(
                    target: LOG_TARGET,
                    call_id = call.id,
                    payload = %call.payload,
                    "unprocessed delivery payload"
                );
                DeliveryStatus::Failed {
                    reason: err.to_string(),
                }
            }
        };
        delivery.acknowledge(status);
    }

    pub async fn handle_call(&self, call: &WebhookCall) -> Result<ProcessOutcome, WorkerError> {
        let outcome = self
            .engine
            .process_value(&call.payload)
            .await
            .map_err(|source| WorkerError::Ingest {
                call_id: call.id,
                source,
            })?;
        debug!(target: LOG_TARGET, lane = self.lane, call_id = call.id, "delivery applied");

        if let Err(err) = self.calls.mark_processed(call.id, Utc::now()).await {
            // The state is committed; a replay of this call is a no-op.
            warn!(target: LOG_TARGET, call_id = call.id, error = %err, "failed to mark call processed");
            return Err(WorkerError::CallLog(err));
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ledger::queue::FifoDeliveryQueue;
    use crate::ledger::store::{InMemoryWebhookCallLog, NewWebhookCall, WebhookCallLog};
    use crate::ledger::test_support::{fixture_time, SnapshotBuilder, ThrowBuilder};
    use serde_json::Value as JsonValue;

    struct Lane {
        queue: Arc<FifoDeliveryQueue>,
        calls: Arc<InMemoryWebhookCallLog>,
        worker: DeliveryWorker,
    }

    fn lane() -> Lane {
        let queue = Arc::new(FifoDeliveryQueue::new(8));
        let calls = Arc::new(InMemoryWebhookCallLog::new());
        let engine = Arc::new(IngestEngine::in_memory(EngineConfig::default()));
        let worker = DeliveryWorker::new(0, queue.clone(), engine, calls.clone());
        Lane {
            queue,
            calls,
            worker,
        }
    }

    async fn record(calls: &InMemoryWebhookCallLog, payload: JsonValue, offset: i64) -> WebhookCall {
        calls
            .record(NewWebhookCall::from_payload(payload, fixture_time(offset)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn successful_delivery_is_marked_processed() {
        let lane = lane();
        let call = record(&lane.calls, SnapshotBuilder::new("m-1").to_json(), 0).await;

        let outcome = lane.worker.handle_call(&call).await.unwrap();
        assert_eq!(outcome.match_row.external_id, "m-1");
        assert!(lane.calls.pending_calls(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_stays_pending() {
        let lane = lane();
        let call = record(&lane.calls, serde_json::json!({ "event": "bogus" }), 0).await;

        let err = lane.worker.handle_call(&call).await.unwrap_err();
        assert!(matches!(err, WorkerError::Ingest { call_id, .. } if call_id == call.id));
        assert_eq!(lane.calls.pending_calls(None).await.unwrap().len(), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn failed_delivery_is_logged_with_event_and_payload() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(logs.clone())
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let lane = lane();
        let call = record(
            &lane.calls,
            serde_json::json!({ "event": "throw", "matchId": "m-9" }),
            0,
        )
        .await;
        let (delivery, ack) = Delivery::with_ack(call);
        lane.worker.handle_delivery(delivery).await;
        assert!(matches!(ack.await.unwrap(), DeliveryStatus::Failed { .. }));

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("delivery left unprocessed"));
        assert!(output.contains("event=throw"));
        assert!(output.contains("call_id=1"));
        assert!(output.contains(r#""matchId":"m-9""#));
    }

    #[tokio::test]
    async fn run_drains_the_lane_until_closed() {
        let lane = lane();
        let first = record(&lane.calls, SnapshotBuilder::new("m-1").to_json(), 0).await;
        let broken = record(&lane.calls, serde_json::json!({ "matchId": "m-1" }), 1).await;
        let second = record(
            &lane.calls,
            ThrowBuilder::new("m-1", "t-1", "d-0").at(2).to_json(),
            2,
        )
        .await;

        let mut acks = Vec::new();
        for call in [first, broken, second] {
            let (delivery, ack) = Delivery::with_ack(call);
            lane.queue.push(delivery).unwrap();
            acks.push(ack);
        }

        let Lane { queue, calls, worker } = lane;
        let handle = tokio::spawn(async move { worker.run().await });
        let mut statuses = Vec::new();
        for ack in acks {
            statuses.push(ack.await.unwrap());
        }
        queue.close();
        handle.await.unwrap().unwrap();

        assert_eq!(statuses[0], DeliveryStatus::Processed);
        assert!(matches!(statuses[1], DeliveryStatus::Failed { .. }));
        assert_eq!(statuses[2], DeliveryStatus::Processed);
        let pending = calls.pending_calls(None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, 2);
    }
}
