// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable event transport: publishing enqueues the envelope on the `queue`
//! table under the topic name, consumers lease entries and ack or fail them.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use parley_core::{
    AdapterType, EventEnvelope, EventPublisher, HealthStatus, ParleyError, PluginAdapter, Topic,
};

use crate::adapter::SqliteStorage;

/// A leased outbox entry with its decoded envelope.
#[derive(Debug, Clone)]
pub struct OutboxDelivery {
    pub entry_id: i64,
    pub attempts: i64,
    pub envelope: EventEnvelope,
}

/// [`EventPublisher`] backed by the SQLite outbox queue.
pub struct SqliteOutbox {
    storage: Arc<SqliteStorage>,
}

impl SqliteOutbox {
    pub fn new(storage: Arc<SqliteStorage>) -> Self {
        Self { storage }
    }

    /// Leases the next event on `topic`.
    ///
    /// An entry whose payload does not decode is marked failed and skipped.
    pub async fn next(&self, topic: Topic) -> Result<Option<OutboxDelivery>, ParleyError> {
        loop {
            let Some(entry) = self.storage.dequeue(&topic.to_string()).await? else {
                return Ok(None);
            };
            match EventEnvelope::from_json(&entry.payload) {
                Ok(envelope) => {
                    return Ok(Some(OutboxDelivery {
                        entry_id: entry.id,
                        attempts: entry.attempts,
                        envelope,
                    }));
                }
                Err(e) => {
                    warn!(entry_id = entry.id, topic = %topic, error = %e, "undecodable outbox entry");
                    self.storage.bury(entry.id).await?;
                }
            }
        }
    }

    pub async fn ack(&self, delivery: &OutboxDelivery) -> Result<(), ParleyError> {
        self.storage.ack(delivery.entry_id).await
    }

    /// Returns the entry to the queue, or retires it once its attempts are used up.
    pub async fn fail(&self, delivery: &OutboxDelivery) -> Result<bool, ParleyError> {
        self.storage.fail(delivery.entry_id).await
    }

    /// Retires the entry without further attempts.
    pub async fn bury(&self, delivery: &OutboxDelivery) -> Result<(), ParleyError> {
        self.storage.bury(delivery.entry_id).await
    }
}

#[async_trait]
impl PluginAdapter for SqliteOutbox {
    fn name(&self) -> &str {
        "sqlite-outbox"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Publisher
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        self.storage.health_check().await
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for SqliteOutbox {
    async fn publish(&self, topic: Topic, event: &EventEnvelope) -> Result<(), ParleyError> {
        let payload = event.to_json()?;
        let id = self
            .storage
            .enqueue(&topic.to_string(), &payload)
            .await
            .map_err(|e| ParleyError::Publish {
                topic: topic.to_string(),
                message: "outbox enqueue failed".to_string(),
                source: Some(Box::new(e)),
            })?;
        debug!(event_id = %event.event_id, topic = %topic, entry_id = id, "event enqueued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_config::model::StorageConfig;
    use parley_core::types::WebhookEvent;

    async fn setup() -> (SqliteOutbox, Arc<SqliteStorage>) {
        let db = crate::Database::open_in_memory().await.unwrap();
        let storage = Arc::new(SqliteStorage::from_database(StorageConfig::default(), db));
        (SqliteOutbox::new(storage.clone()), storage)
    }

    #[tokio::test]
    async fn publish_then_consume() {
        let (outbox, _storage) = setup().await;
        let event = WebhookEvent::pending("org-1", "wa-1", "whatsapp", &serde_json::json!({}));
        let envelope = EventEnvelope::webhook_received(&event);

        outbox.publish(Topic::WebhookReceived, &envelope).await.unwrap();
        assert!(outbox.next(Topic::MessageCreated).await.unwrap().is_none());

        let delivery = outbox.next(Topic::WebhookReceived).await.unwrap().unwrap();
        assert_eq!(delivery.envelope, envelope);
        outbox.ack(&delivery).await.unwrap();
        assert!(outbox.next(Topic::WebhookReceived).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn poisoned_entry_is_skipped() {
        let (outbox, storage) = setup().await;
        storage.enqueue("message-created", "not json").await.unwrap();
        let event = WebhookEvent::pending("org-1", "wa-1", "whatsapp", &serde_json::json!({}));
        let envelope = EventEnvelope::webhook_received(&event);
        outbox.publish(Topic::MessageCreated, &envelope).await.unwrap();

        let delivery = outbox.next(Topic::MessageCreated).await.unwrap().unwrap();
        assert_eq!(delivery.envelope.event_id, envelope.event_id);
    }

    #[tokio::test]
    async fn publish_before_initialize_is_publish_error() {
        let storage = Arc::new(SqliteStorage::new(StorageConfig::default()));
        let outbox = SqliteOutbox::new(storage.clone());
        let event = WebhookEvent::pending("org-1", "wa-1", "whatsapp", &serde_json::json!({}));
        let err = outbox
            .publish(Topic::WebhookReceived, &EventEnvelope::webhook_received(&event))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Publish { .. }));
        assert!(err.is_retryable());
        assert!(storage.db().is_err());
    }
}
