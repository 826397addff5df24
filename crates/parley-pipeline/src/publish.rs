// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-bounded publishing.

use std::time::Duration;

use parley_core::{EventEnvelope, EventPublisher, ParleyError, Topic};
use tracing::warn;

/// Publishes `event`, failing with [`ParleyError::Timeout`] when the
/// transport does not accept it within `timeout`.
pub async fn publish_bounded(
    publisher: &dyn EventPublisher,
    topic: Topic,
    event: &EventEnvelope,
    timeout: Duration,
) -> Result<(), ParleyError> {
    match tokio::time::timeout(timeout, publisher.publish(topic, event)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(event_id = %event.event_id, topic = %topic, ?timeout, "publish timed out");
            Err(ParleyError::Timeout { duration: timeout })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::WebhookEvent;
    use parley_test_utils::RecordingPublisher;

    fn envelope() -> EventEnvelope {
        let event = WebhookEvent::pending("org-1", "wa-1", "whatsapp", &serde_json::json!({}));
        EventEnvelope::webhook_received(&event)
    }

    #[tokio::test]
    async fn stalled_publisher_times_out() {
        let publisher = RecordingPublisher::new();
        publisher.set_delay(Some(Duration::from_secs(5))).await;
        let err = publish_bounded(
            &publisher,
            Topic::WebhookReceived,
            &envelope(),
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ParleyError::Timeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn fast_publisher_succeeds() {
        let publisher = RecordingPublisher::new();
        publish_bounded(
            &publisher,
            Topic::WebhookReceived,
            &envelope(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(publisher.events().await.len(), 1);
    }
}
