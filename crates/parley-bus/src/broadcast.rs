// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process fan-out of event envelopes, one broadcast channel per topic.
//!
//! Subscribers that fall more than `capacity` events behind lose the oldest
//! events (`Lagged`); this transport is for consumers living in the same
//! process. Durable delivery goes through the SQLite outbox instead.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use parley_core::{
    AdapterType, EventEnvelope, EventPublisher, HealthStatus, ParleyError, PluginAdapter, Topic,
};

use crate::dedup::Deduplicator;

/// [`EventPublisher`] that broadcasts to every live subscriber of a topic.
pub struct BroadcastPublisher {
    capacity: usize,
    channels: DashMap<Topic, broadcast::Sender<EventEnvelope>>,
    closed: AtomicBool,
}

impl BroadcastPublisher {
    /// Creates a publisher whose per-topic channels buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn sender(&self, topic: Topic) -> broadcast::Sender<EventEnvelope> {
        self.channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// A raw receiver for `topic`. Sees only events published after this call.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<EventEnvelope> {
        self.sender(topic).subscribe()
    }

    /// A deduplicating subscription for `topic`.
    pub fn subscription(&self, topic: Topic, dedup_window: usize) -> Subscription {
        Subscription {
            topic,
            receiver: self.subscribe(topic),
            dedup: Deduplicator::new(dedup_window),
        }
    }

    /// Number of live receivers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.channels
            .get(&topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl PluginAdapter for BroadcastPublisher {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Publisher
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        if self.closed.load(Ordering::Acquire) {
            Ok(HealthStatus::Unhealthy("publisher shut down".into()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }

    /// Closes every topic. Subscribers drain what is buffered, then see the
    /// end of the stream.
    async fn shutdown(&self) -> Result<(), ParleyError> {
        self.closed.store(true, Ordering::Release);
        self.channels.clear();
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, topic: Topic, event: &EventEnvelope) -> Result<(), ParleyError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ParleyError::Publish {
                topic: topic.to_string(),
                message: "publisher is shut down".to_string(),
                source: None,
            });
        }
        match self.sender(topic).send(event.clone()) {
            Ok(receivers) => {
                debug!(event_id = %event.event_id, topic = %topic, receivers, "event broadcast");
            }
            // No live subscriber is not a transport failure.
            Err(_) => {
                debug!(event_id = %event.event_id, topic = %topic, "event broadcast with no subscribers");
            }
        }
        Ok(())
    }
}

/// A topic receiver that drops repeated `event_id`s.
pub struct Subscription {
    topic: Topic,
    receiver: broadcast::Receiver<EventEnvelope>,
    dedup: Deduplicator,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// The next event not seen before, or `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.dedup.first_seen(&event.event_id) {
                        return Some(event);
                    }
                    debug!(event_id = %event.event_id, topic = %self.topic, "duplicate event dropped");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "subscriber lagged; events lost");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
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
    async fn every_subscriber_receives_the_event() {
        let publisher = BroadcastPublisher::new(16);
        let mut a = publisher.subscribe(Topic::WebhookReceived);
        let mut b = publisher.subscribe(Topic::WebhookReceived);
        let mut other = publisher.subscribe(Topic::MessageCreated);
        assert_eq!(publisher.subscriber_count(Topic::WebhookReceived), 2);

        let event = envelope();
        publisher.publish(Topic::WebhookReceived, &event).await.unwrap();

        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let publisher = BroadcastPublisher::new(4);
        publisher
            .publish(Topic::MessageDelivery, &envelope())
            .await
            .unwrap();
        assert_eq!(publisher.subscriber_count(Topic::MessageDelivery), 0);
    }

    #[tokio::test]
    async fn subscription_drops_republished_events() {
        let publisher = BroadcastPublisher::new(16);
        let mut subscription = publisher.subscription(Topic::WebhookReceived, 8);
        let first = envelope();
        let second = envelope();

        publisher.publish(Topic::WebhookReceived, &first).await.unwrap();
        publisher.publish(Topic::WebhookReceived, &first).await.unwrap();
        publisher.publish(Topic::WebhookReceived, &second).await.unwrap();

        assert_eq!(subscription.recv().await.unwrap().event_id, first.event_id);
        assert_eq!(subscription.recv().await.unwrap().event_id, second.event_id);
    }

    #[tokio::test]
    async fn shutdown_ends_subscriptions_and_rejects_publish() {
        let publisher = BroadcastPublisher::new(16);
        let mut subscription = publisher.subscription(Topic::MessageCreated, 8);
        let event = envelope();
        publisher.publish(Topic::MessageCreated, &event).await.unwrap();

        publisher.shutdown().await.unwrap();
        assert_eq!(subscription.recv().await.unwrap(), event);
        assert!(subscription.recv().await.is_none());

        let err = publisher
            .publish(Topic::MessageCreated, &event)
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Publish { .. }));
        assert!(matches!(
            publisher.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
    }

    #[tokio::test]
    async fn lagging_subscriber_keeps_receiving() {
        let publisher = BroadcastPublisher::new(2);
        let mut subscription = publisher.subscription(Topic::WebhookReceived, 16);
        let events: Vec<EventEnvelope> = (0..5).map(|_| envelope()).collect();
        for event in &events {
            publisher.publish(Topic::WebhookReceived, event).await.unwrap();
        }
        let received = subscription.recv().await.unwrap();
        assert_eq!(received.event_id, events[3].event_id);
    }
}
