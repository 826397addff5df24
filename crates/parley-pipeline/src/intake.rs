// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable webhook intake with retry bookkeeping.
//!
//! Every delivery is stored `pending` before anything else happens, so a
//! crash mid-processing leaves a row that [`WebhookIntake::retry_pending`]
//! picks up. Outcomes:
//!
//! - no normalizer for the platform, unparseable payload, rejected envelope
//!   or a permanent downstream error: `failed`, never retried;
//! - timeout or transient downstream error: `retry_count + 1`, still
//!   `pending` until `max_retries` is reached, then `failed`;
//! - success: `processed`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_config::model::{IntakeConfig, PublisherConfig};
use parley_core::types::{CanonicalMessage, WebhookEvent, WebhookStatus};
use parley_core::{EventEnvelope, EventPublisher, ParleyError, StorageAdapter, Topic};
use parley_normalize::NormalizerRegistry;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::publish::publish_bounded;

/// Receives the canonical messages extracted from one webhook event.
///
/// A retryable error puts the event back in the retry budget; any other
/// error fails it permanently.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(
        &self,
        event: &WebhookEvent,
        messages: Vec<CanonicalMessage>,
    ) -> Result<(), ParleyError>;
}

/// Retry and timeout limits for [`WebhookIntake`].
#[derive(Debug, Clone)]
pub struct IntakeSettings {
    pub max_retries: i64,
    pub process_timeout: Duration,
    pub publish_timeout: Duration,
    pub retry_batch_size: i64,
}

impl IntakeSettings {
    pub fn from_config(intake: &IntakeConfig, publisher: &PublisherConfig) -> Self {
        Self {
            max_retries: intake.max_retries,
            process_timeout: Duration::from_millis(intake.process_timeout_ms),
            publish_timeout: Duration::from_millis(publisher.publish_timeout_ms),
            retry_batch_size: intake.retry_batch_size,
        }
    }
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self::from_config(&IntakeConfig::default(), &PublisherConfig::default())
    }
}

pub struct WebhookIntake {
    storage: Arc<dyn StorageAdapter>,
    registry: NormalizerRegistry,
    sink: Arc<dyn MessageSink>,
    publisher: Arc<dyn EventPublisher>,
    settings: IntakeSettings,
}

impl WebhookIntake {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        registry: NormalizerRegistry,
        sink: Arc<dyn MessageSink>,
        publisher: Arc<dyn EventPublisher>,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            storage,
            registry,
            sink,
            publisher,
            settings,
        }
    }

    pub fn settings(&self) -> &IntakeSettings {
        &self.settings
    }

    /// Stores the delivery, announces it on `webhook-received`, then
    /// processes it. Returns the event as stored after processing.
    ///
    /// Processing failures are recorded on the returned event. A failed
    /// announcement does not stop processing, but it is returned as the
    /// error once processing is done; [`WebhookIntake::announce`] republishes.
    pub async fn receive(
        &self,
        platform: &str,
        organization_id: &str,
        medium_id: &str,
        payload: &Value,
    ) -> Result<WebhookEvent, ParleyError> {
        let event = WebhookEvent::pending(organization_id, medium_id, platform, payload);
        self.storage.insert_webhook_event(&event).await?;
        info!(
            webhook_event_id = %event.id,
            platform,
            organization_id,
            medium_id,
            "webhook received"
        );

        let announced = self.publish_received(&event).await;
        let processed = self.process(event).await?;
        if let Err(e) = announced {
            error!(
                webhook_event_id = %processed.id,
                status = %processed.status,
                error = %e,
                "webhook-received not published"
            );
            return Err(e);
        }
        Ok(processed)
    }

    /// Republishes `webhook-received` for a stored event. The envelope id is
    /// derived from the event id, so consumers see it as a redelivery.
    pub async fn announce(&self, event_id: &str) -> Result<(), ParleyError> {
        let event = self
            .storage
            .get_webhook_event(event_id)
            .await?
            .ok_or_else(|| ParleyError::not_found("webhook event", event_id))?;
        self.publish_received(&event).await
    }

    async fn publish_received(&self, event: &WebhookEvent) -> Result<(), ParleyError> {
        publish_bounded(
            self.publisher.as_ref(),
            Topic::WebhookReceived,
            &EventEnvelope::webhook_received(event),
            self.settings.publish_timeout,
        )
        .await
    }

    /// Replays one stored event. Processed and failed events come back
    /// unchanged.
    pub async fn reprocess(&self, event_id: &str) -> Result<WebhookEvent, ParleyError> {
        let event = self
            .storage
            .get_webhook_event(event_id)
            .await?
            .ok_or_else(|| ParleyError::not_found("webhook event", event_id))?;
        self.process(event).await
    }

    /// Replays up to `retry_batch_size` pending events, oldest first.
    /// Returns each event's state afterwards.
    pub async fn retry_pending(&self) -> Result<Vec<WebhookEvent>, ParleyError> {
        let pending = self
            .storage
            .list_pending_webhook_events(self.settings.retry_batch_size)
            .await?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = pending.len(), "retrying pending webhook events");

        let mut results = Vec::with_capacity(pending.len());
        for event in pending {
            let id = event.id.clone();
            match self.process(event).await {
                Ok(updated) => results.push(updated),
                Err(e) => error!(webhook_event_id = %id, error = %e, "retry sweep failed on event"),
            }
        }
        Ok(results)
    }

    async fn process(&self, event: WebhookEvent) -> Result<WebhookEvent, ParleyError> {
        if event.status != WebhookStatus::Pending {
            debug!(webhook_event_id = %event.id, status = %event.status, "event already settled");
            return Ok(event);
        }

        let Some(normalizer) = self.registry.get(&event.platform) else {
            let reason = ParleyError::UnknownPlatform(event.platform.clone()).to_string();
            warn!(webhook_event_id = %event.id, platform = %event.platform, "no normalizer registered");
            return self.storage.mark_webhook_failed(&event.id, &reason).await;
        };

        let payload: Value = match serde_json::from_str(&event.payload) {
            Ok(payload) => payload,
            Err(e) => {
                let reason = format!("stored payload is not valid JSON: {e}");
                return self.storage.mark_webhook_failed(&event.id, &reason).await;
            }
        };
        if let Err(e) = normalizer.validate(&payload) {
            warn!(webhook_event_id = %event.id, error = %e, "webhook rejected");
            return self.storage.mark_webhook_failed(&event.id, &e.to_string()).await;
        }

        let work = async {
            let messages = normalizer.extract(&payload);
            debug!(webhook_event_id = %event.id, count = messages.len(), "messages extracted");
            self.sink.deliver(&event, messages).await
        };
        let outcome = match tokio::time::timeout(self.settings.process_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(ParleyError::Timeout {
                duration: self.settings.process_timeout,
            }),
        };

        match outcome {
            Ok(()) => {
                let processed = self.storage.mark_webhook_processed(&event.id).await?;
                info!(webhook_event_id = %event.id, "webhook processed");
                Ok(processed)
            }
            Err(e) if e.is_retryable() => {
                let updated = self
                    .storage
                    .record_webhook_retry(&event.id, &e.to_string(), self.settings.max_retries)
                    .await?;
                if updated.status == WebhookStatus::Failed {
                    error!(
                        webhook_event_id = %event.id,
                        retry_count = updated.retry_count,
                        error = %e,
                        "webhook failed after exhausting retries"
                    );
                } else {
                    warn!(
                        webhook_event_id = %event.id,
                        retry_count = updated.retry_count,
                        error = %e,
                        "webhook processing failed, will retry"
                    );
                }
                Ok(updated)
            }
            Err(e) => {
                warn!(webhook_event_id = %event.id, error = %e, "webhook failed permanently");
                self.storage.mark_webhook_failed(&event.id, &e.to_string()).await
            }
        }
    }
}
