// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publisher double that records every envelope it accepts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use parley_core::{
    AdapterType, EventEnvelope, EventPublisher, HealthStatus, ParleyError, PluginAdapter, Topic,
};

/// Records published events in order.
///
/// `set_failing(true)` makes every publish return [`ParleyError::Publish`];
/// `set_delay` makes publishes sleep first, for exercising timeouts.
pub struct RecordingPublisher {
    events: Mutex<Vec<(Topic, EventEnvelope)>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().await = delay;
    }

    /// Every recorded `(topic, envelope)` pair.
    pub async fn events(&self) -> Vec<(Topic, EventEnvelope)> {
        self.events.lock().await.clone()
    }

    /// Envelopes recorded on `topic`.
    pub async fn events_on(&self, topic: Topic) -> Vec<EventEnvelope> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for RecordingPublisher {
    fn name(&self) -> &str {
        "recording-publisher"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Publisher
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: Topic, event: &EventEnvelope) -> Result<(), ParleyError> {
        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ParleyError::Publish {
                topic: topic.to_string(),
                message: "recording publisher set to fail".to_string(),
                source: None,
            });
        }
        self.events.lock().await.push((topic, event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::WebhookEvent;

    fn envelope() -> EventEnvelope {
        let event = WebhookEvent::pending("org-1", "wa-1", "whatsapp", &serde_json::json!({}));
        EventEnvelope::webhook_received(&event)
    }

    #[tokio::test]
    async fn records_by_topic() {
        let publisher = RecordingPublisher::new();
        let event = envelope();
        publisher.publish(Topic::WebhookReceived, &event).await.unwrap();
        publisher.publish(Topic::MessageCreated, &event).await.unwrap();

        assert_eq!(publisher.events().await.len(), 2);
        assert_eq!(publisher.events_on(Topic::MessageCreated).await, vec![event]);
        publisher.clear().await;
        assert!(publisher.events().await.is_empty());
    }

    #[tokio::test]
    async fn failing_mode_records_nothing() {
        let publisher = RecordingPublisher::new();
        publisher.set_failing(true);
        let err = publisher
            .publish(Topic::MessageDelivery, &envelope())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(publisher.events().await.is_empty());
    }
}
