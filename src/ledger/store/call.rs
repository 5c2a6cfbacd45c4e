use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, Level};

use crate::db::entity::webhook_calls;
use crate::ledger::error::IngestError;
use crate::ledger::messages::WebhookEvent;
use crate::ledger::types::CallId;

pub type SharedCallLog = Arc<dyn WebhookCallLog>;

const LOG_TARGET: &str = "darts_ledger::ledger::call_log";

/// One raw delivery as the webhook endpoint recorded it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WebhookCall {
    pub id: CallId,
    pub match_id: Option<String>,
    pub event: String,
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookCall {
    pub fn parse(&self) -> Result<WebhookEvent, IngestError> {
        WebhookEvent::from_value(&self.payload)
    }

    /// Ordering key for replays: arrival time, ties broken by insertion order.
    pub fn arrival(&self) -> (DateTime<Utc>, CallId) {
        (self.created_at, self.id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewWebhookCall {
    pub match_id: Option<String>,
    pub event: String,
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl NewWebhookCall {
    /// Picks the routing columns out of a payload without validating it.
    pub fn from_payload(payload: JsonValue, created_at: DateTime<Utc>) -> Self {
        let match_id = payload
            .get("matchId")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        let event = payload
            .get("event")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            match_id,
            event,
            payload,
            created_at,
        }
    }
}

/// Append-only log of raw deliveries, written before the engine runs.
#[async_trait]
pub trait WebhookCallLog: Send + Sync {
    async fn record(&self, call: NewWebhookCall) -> anyhow::Result<WebhookCall>;

    /// Every call for a match in arrival order.
    async fn calls_for_match(&self, match_id: &str) -> anyhow::Result<Vec<WebhookCall>>;

    /// Calls never marked processed, in arrival order.
    async fn pending_calls(&self, match_id: Option<&str>) -> anyhow::Result<Vec<WebhookCall>>;

    async fn mark_processed(&self, id: CallId, at: DateTime<Utc>) -> anyhow::Result<()>;
}

pub struct SeaOrmWebhookCallLog {
    pub connection: DatabaseConnection,
}

impl SeaOrmWebhookCallLog {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

fn model_to_call(model: webhook_calls::Model) -> WebhookCall {
    WebhookCall {
        id: model.id,
        match_id: model.match_id,
        event: model.event,
        payload: model.payload,
        created_at: model.created_at,
        processed_at: model.processed_at,
    }
}

#[async_trait]
impl WebhookCallLog for SeaOrmWebhookCallLog {
    async fn record(&self, call: NewWebhookCall) -> anyhow::Result<WebhookCall> {
        if tracing::enabled!(Level::DEBUG) {
            let payload_json = serde_json::to_string(&call.payload)?;
            debug!(
                target: LOG_TARGET,
                match_id = ?call.match_id,
                event = %call.event,
                %payload_json,
                "recording webhook call"
            );
        }
        let active = webhook_calls::ActiveModel {
            match_id: Set(call.match_id),
            event: Set(call.event),
            payload: Set(call.payload),
            created_at: Set(call.created_at),
            processed_at: Set(None),
            ..Default::default()
        };
        let model = active
            .insert(&self.connection)
            .await
            .context("failed to record webhook call")?;
        Ok(model_to_call(model))
    }

    async fn calls_for_match(&self, match_id: &str) -> anyhow::Result<Vec<WebhookCall>> {
        let rows = webhook_calls::Entity::find()
            .filter(webhook_calls::Column::MatchId.eq(match_id))
            .order_by_asc(webhook_calls::Column::CreatedAt)
            .order_by_asc(webhook_calls::Column::Id)
            .all(&self.connection)
            .await
            .context("failed to load webhook calls for match")?;
        Ok(rows.into_iter().map(model_to_call).collect())
    }

    async fn pending_calls(&self, match_id: Option<&str>) -> anyhow::Result<Vec<WebhookCall>> {
        let mut query =
            webhook_calls::Entity::find().filter(webhook_calls::Column::ProcessedAt.is_null());
        if let Some(match_id) = match_id {
            query = query.filter(webhook_calls::Column::MatchId.eq(match_id));
        }
        let rows = query
            .order_by_asc(webhook_calls::Column::CreatedAt)
            .order_by_asc(webhook_calls::Column::Id)
            .all(&self.connection)
            .await
            .context("failed to load pending webhook calls")?;
        Ok(rows.into_iter().map(model_to_call).collect())
    }

    async fn mark_processed(&self, id: CallId, at: DateTime<Utc>) -> anyhow::Result<()> {
        let active = webhook_calls::ActiveModel {
            id: Set(id),
            processed_at: Set(Some(at)),
            ..Default::default()
        };
        active
            .update(&self.connection)
            .await
            .with_context(|| format!("failed to mark webhook call {id} processed"))?;
        Ok(())
    }
}

#[derive(Default)]
struct CallTable {
    calls: Vec<WebhookCall>,
    next_id: CallId,
}

/// Process-local call log for tests and tools.
#[derive(Default)]
pub struct InMemoryWebhookCallLog {
    inner: RwLock<CallTable>,
}

impl InMemoryWebhookCallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sorted(mut calls: Vec<WebhookCall>) -> Vec<WebhookCall> {
        calls.sort_by_key(WebhookCall::arrival);
        calls
    }
}

#[async_trait]
impl WebhookCallLog for InMemoryWebhookCallLog {
    async fn record(&self, call: NewWebhookCall) -> anyhow::Result<WebhookCall> {
        let mut table = self.inner.write();
        table.next_id += 1;
        let stored = WebhookCall {
            id: table.next_id,
            match_id: call.match_id,
            event: call.event,
            payload: call.payload,
            created_at: call.created_at,
            processed_at: None,
        };
        table.calls.push(stored.clone());
        Ok(stored)
    }

    async fn calls_for_match(&self, match_id: &str) -> anyhow::Result<Vec<WebhookCall>> {
        let table = self.inner.read();
        let calls = table
            .calls
            .iter()
            .filter(|call| call.match_id.as_deref() == Some(match_id))
            .cloned()
            .collect();
        Ok(Self::sorted(calls))
    }

    async fn pending_calls(&self, match_id: Option<&str>) -> anyhow::Result<Vec<WebhookCall>> {
        let table = self.inner.read();
        let calls = table
            .calls
            .iter()
            .filter(|call| call.processed_at.is_none())
            .filter(|call| match_id.map_or(true, |id| call.match_id.as_deref() == Some(id)))
            .cloned()
            .collect();
        Ok(Self::sorted(calls))
    }

    async fn mark_processed(&self, id: CallId, at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut table = self.inner.write();
        let call = table
            .calls
            .iter_mut()
            .find(|call| call.id == id)
            .ok_or_else(|| anyhow!("webhook call {id} not found"))?;
        call.processed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::test_support::{fixture_time, SnapshotBuilder, ThrowBuilder};

    #[tokio::test]
    async fn calls_come_back_in_arrival_order() {
        let log = InMemoryWebhookCallLog::new();
        log.record(NewWebhookCall::from_payload(
            ThrowBuilder::new("m-1", "t-1", "d-0").to_json(),
            fixture_time(5),
        ))
        .await
        .unwrap();
        log.record(NewWebhookCall::from_payload(
            SnapshotBuilder::new("m-1").to_json(),
            fixture_time(1),
        ))
        .await
        .unwrap();
        log.record(NewWebhookCall::from_payload(
            SnapshotBuilder::new("m-2").to_json(),
            fixture_time(0),
        ))
        .await
        .unwrap();

        let calls = log.calls_for_match("m-1").await.unwrap();
        let events: Vec<&str> = calls.iter().map(|call| call.event.as_str()).collect();
        assert_eq!(events, vec!["match_state", "throw"]);
        assert!(calls[0].parse().is_ok());
    }

    #[tokio::test]
    async fn processed_calls_leave_the_pending_list() {
        let log = InMemoryWebhookCallLog::new();
        let first = log
            .record(NewWebhookCall::from_payload(
                SnapshotBuilder::new("m-1").to_json(),
                fixture_time(0),
            ))
            .await
            .unwrap();
        log.record(NewWebhookCall::from_payload(
            SnapshotBuilder::new("m-2").to_json(),
            fixture_time(1),
        ))
        .await
        .unwrap();

        log.mark_processed(first.id, fixture_time(2)).await.unwrap();
        assert_eq!(log.pending_calls(None).await.unwrap().len(), 1);
        assert!(log.pending_calls(Some("m-1")).await.unwrap().is_empty());
        assert!(log.mark_processed(99, fixture_time(3)).await.is_err());
    }

    #[test]
    fn routing_columns_tolerate_garbage() {
        let call = NewWebhookCall::from_payload(serde_json::json!([1, 2]), fixture_time(0));
        assert_eq!(call.match_id, None);
        assert_eq!(call.event, "");
    }
}
