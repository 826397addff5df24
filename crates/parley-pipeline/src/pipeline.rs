// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring between the stages: what happens to a canonical message after
//! intake, to an AI response, and to a delivery-status callback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::types::{
    CanonicalMessage, ConversationKey, Direction, Message, MessageStatus, NewMessage, SenderType,
    StatusTransition, WebhookEvent,
};
use parley_core::{
    ContactDirectory, EventEnvelope, EventPayload, EventPublisher, ParleyError, StorageAdapter,
    Topic,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::intake::MessageSink;
use crate::lifecycle::{require_body, MessageLifecycleManager};
use crate::publish::publish_bounded;
use crate::resolver::ConversationResolver;

/// Platform message id given to AI replies, keyed on the response event so a
/// redelivered response does not create a second message.
pub fn ai_reply_key(event_id: &str) -> String {
    format!("ai-response:{event_id}")
}

pub struct Pipeline {
    directory: Arc<dyn ContactDirectory>,
    resolver: ConversationResolver,
    lifecycle: MessageLifecycleManager,
    publisher: Arc<dyn EventPublisher>,
    publish_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        directory: Arc<dyn ContactDirectory>,
        publisher: Arc<dyn EventPublisher>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            resolver: ConversationResolver::new(storage.clone()),
            lifecycle: MessageLifecycleManager::new(storage),
            publisher,
            publish_timeout,
        }
    }

    pub fn resolver(&self) -> &ConversationResolver {
        &self.resolver
    }

    pub fn lifecycle(&self) -> &MessageLifecycleManager {
        &self.lifecycle
    }

    /// Maps the sender to a contact, resolves the conversation, stores the
    /// inbound message and publishes `message-created`.
    pub async fn ingest_message(
        &self,
        event: &WebhookEvent,
        canonical: CanonicalMessage,
    ) -> Result<Message, ParleyError> {
        require_body(&canonical.content, canonical.media_url.as_deref())?;
        let contact = self
            .directory
            .resolve_contact(
                &event.organization_id,
                &event.medium_id,
                &canonical.origin,
                canonical.sender_name.as_deref(),
            )
            .await?;
        let conversation = self
            .resolver
            .resolve(&ConversationKey {
                organization_id: event.organization_id.clone(),
                user_id: contact.user_id.clone(),
                contact_id: contact.contact_id.clone(),
                medium_id: event.medium_id.clone(),
            })
            .await?;

        let mut metadata = canonical.metadata;
        metadata.insert("platform".into(), Value::String(event.platform.clone()));
        metadata.insert("webhook_event_id".into(), Value::String(event.id.clone()));

        let message = self
            .lifecycle
            .create_message(NewMessage {
                conversation_id: conversation.id.clone(),
                organization_id: event.organization_id.clone(),
                direction: Direction::Inbound,
                sender_type: SenderType::Customer,
                sender_id: Some(contact.contact_id.clone()),
                sender_name: canonical.sender_name.or(contact.display_name),
                message_type: canonical.message_type,
                content: canonical.content,
                media_url: canonical.media_url,
                metadata: Some(Value::Object(metadata)),
                platform_message_id: canonical.platform_message_id,
                created_at: canonical.timestamp,
                ..NewMessage::default()
            })
            .await?;

        publish_bounded(
            self.publisher.as_ref(),
            Topic::MessageCreated,
            &EventEnvelope::message_created(&message, &conversation),
            self.publish_timeout,
        )
        .await?;
        debug!(message_id = %message.id, conversation_id = %conversation.id, "inbound message ingested");
        Ok(message)
    }

    /// Stores the AI reply carried by an `ai-response-received` event and
    /// publishes `message-delivery` for it.
    pub async fn handle_ai_response(&self, event: &EventEnvelope) -> Result<Message, ParleyError> {
        let EventPayload::AiResponseReceived {
            content,
            message_type,
            media_url,
            confidence,
            in_reply_to,
        } = &event.payload
        else {
            return Err(ParleyError::Validation(format!(
                "event {} on `{}` is not an AI response",
                event.event_id, event.topic
            )));
        };
        let conversation_id = event.conversation_id.as_deref().ok_or_else(|| {
            ParleyError::Validation(format!("AI response {} has no conversation", event.event_id))
        })?;
        let conversation = self.resolver.get(conversation_id).await?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("ai_event_id".into(), Value::String(event.event_id.clone()));
        if let Some(in_reply_to) = in_reply_to {
            metadata.insert("in_reply_to".into(), Value::String(in_reply_to.clone()));
        }

        let message = self
            .lifecycle
            .create_message(NewMessage {
                conversation_id: conversation.id.clone(),
                organization_id: conversation.organization_id.clone(),
                direction: Direction::Outbound,
                sender_type: SenderType::Ai,
                message_type: *message_type,
                content: content.clone(),
                media_url: media_url.clone(),
                metadata: Some(Value::Object(metadata)),
                platform_message_id: Some(ai_reply_key(&event.event_id)),
                is_ai_generated: true,
                ai_confidence: *confidence,
                ..NewMessage::default()
            })
            .await?;

        publish_bounded(
            self.publisher.as_ref(),
            Topic::MessageDelivery,
            &EventEnvelope::message_delivery(&message, &conversation),
            self.publish_timeout,
        )
        .await?;
        info!(
            message_id = %message.id,
            conversation_id = %conversation.id,
            ai_event_id = %event.event_id,
            "AI reply queued for delivery"
        );
        Ok(message)
    }

    /// Applies a delivery-status callback carrying a wire ordinal
    /// (`pending=0 .. failed=4`).
    pub async fn report_delivery_status(
        &self,
        message_id: &str,
        code: i64,
        failure_reason: Option<&str>,
    ) -> Result<StatusTransition, ParleyError> {
        let status = MessageStatus::from_code(code)?;
        self.lifecycle
            .update_status(message_id, status, failure_reason)
            .await
    }
}

#[async_trait]
impl MessageSink for Pipeline {
    async fn deliver(
        &self,
        event: &WebhookEvent,
        messages: Vec<CanonicalMessage>,
    ) -> Result<(), ParleyError> {
        for (index, canonical) in messages.into_iter().enumerate() {
            match self.ingest_message(event, canonical).await {
                Ok(_) => {}
                Err(ParleyError::Validation(reason)) => {
                    warn!(webhook_event_id = %event.id, index, %reason, "dropping invalid message");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{MessageType, Platform};
    use parley_normalize::NormalizerRegistry;
    use parley_test_utils::{fixtures, TestHarness};

    use crate::intake::{IntakeSettings, WebhookIntake};

    fn pipeline(harness: &TestHarness) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            harness.storage_adapter(),
            harness.directory(),
            harness.publisher.clone(),
            Duration::from_secs(1),
        ))
    }

    fn intake(harness: &TestHarness, pipeline: Arc<Pipeline>) -> WebhookIntake {
        WebhookIntake::new(
            harness.storage_adapter(),
            NormalizerRegistry::with_defaults(),
            pipeline,
            harness.publisher.clone(),
            IntakeSettings::default(),
        )
    }

    #[tokio::test]
    async fn inbound_webhook_reaches_message_created() {
        let harness = TestHarness::new().await.unwrap();
        let pipeline = pipeline(&harness);
        let intake = intake(&harness, pipeline.clone());

        let payload = fixtures::whatsapp_text("6281234567890", "wamid.1", "hello");
        let event = intake
            .receive("whatsapp", "org-test", "wa-test", &payload)
            .await
            .unwrap();
        assert_eq!(event.status, parley_core::WebhookStatus::Processed);

        let created = harness.publisher.events_on(Topic::MessageCreated).await;
        assert_eq!(created.len(), 1);
        let message = pipeline
            .lifecycle()
            .get_message(created[0].message_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(message.content, "hello");
        assert_eq!(message.direction, Direction::Inbound);
        assert_eq!(message.platform_message_id.as_deref(), Some("wamid.1"));

        let conversation = pipeline.resolver().get(&message.conversation_id).await.unwrap();
        assert_eq!(conversation.last_message_content.as_deref(), Some("hello"));
        assert_eq!(conversation.last_message_by_name.as_deref(), Some("Test Customer"));
        assert_eq!(conversation.user_id, "user-test");
    }

    #[tokio::test]
    async fn redelivered_webhook_does_not_duplicate_messages() {
        let harness = TestHarness::new().await.unwrap();
        let pipeline = pipeline(&harness);
        let intake = intake(&harness, pipeline.clone());
        let payload = fixtures::whatsapp_text("628", "wamid.dup", "once");

        intake.receive("whatsapp", "org-test", "wa-test", &payload).await.unwrap();
        intake.receive("whatsapp", "org-test", "wa-test", &payload).await.unwrap();

        let created = harness.publisher.events_on(Topic::MessageCreated).await;
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].event_id, created[1].event_id);
        let messages = pipeline
            .lifecycle()
            .list_messages(created[0].conversation_id.as_deref().unwrap(), None)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn unregistered_medium_fails_event() {
        let harness = TestHarness::new().await.unwrap();
        let intake = intake(&harness, pipeline(&harness));
        let payload = fixtures::whatsapp_text("628", "wamid.x", "hi");
        let event = intake
            .receive("whatsapp", "org-test", "wa-unregistered", &payload)
            .await
            .unwrap();
        assert_eq!(event.status, parley_core::WebhookStatus::Failed);
        assert_eq!(event.retry_count, 0);
    }

    #[tokio::test]
    async fn publish_failure_retries_webhook() {
        let harness = TestHarness::new().await.unwrap();
        let pipeline = pipeline(&harness);
        let intake = intake(&harness, pipeline.clone());
        let payload = fixtures::whatsapp_text("628", "wamid.p", "hi");

        harness.publisher.set_failing(true);
        let err = intake
            .receive("whatsapp", "org-test", "wa-test", &payload)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        let pending = harness.storage.list_pending_webhook_events(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);

        harness.publisher.set_failing(false);
        let retried = intake.reprocess(&pending[0].id).await.unwrap();
        assert_eq!(retried.status, parley_core::WebhookStatus::Processed);
        assert_eq!(harness.publisher.events_on(Topic::MessageCreated).await.len(), 1);
        intake.announce(&retried.id).await.unwrap();
        assert_eq!(harness.publisher.events_on(Topic::WebhookReceived).await.len(), 1);
    }

    #[tokio::test]
    async fn bodiless_messages_do_not_sink_their_batch() {
        let harness = TestHarness::builder()
            .with_medium("fb-test", Platform::Facebook)
            .with_medium("mail-test", Platform::Email)
            .build()
            .await
            .unwrap();
        let pipeline = pipeline(&harness);
        let intake = intake(&harness, pipeline.clone());

        let page = serde_json::json!({"object": "page", "entry": [{"id": "PAGE-TEST", "messaging": [
            {"sender": {"id": "PSID-pin"}, "recipient": {"id": "PAGE-TEST"},
             "message": {"mid": "m_pin", "attachments": [{"type": "location", "payload": {}}]}},
            {"sender": {"id": "PSID-hi"}, "recipient": {"id": "PAGE-TEST"},
             "message": {"mid": "m_hi", "text": "hello"}}
        ]}]});
        let event = intake.receive("facebook", "org-test", "fb-test", &page).await.unwrap();
        assert_eq!(event.status, parley_core::WebhookStatus::Processed);

        let mail = serde_json::json!([
            {"from": "a@example.com", "attachments": [{"filename": "x.pdf"}]},
            fixtures::email("b@example.com", "Order", "where is it?")
        ]);
        let event = intake.receive("email", "org-test", "mail-test", &mail).await.unwrap();
        assert_eq!(event.status, parley_core::WebhookStatus::Processed);

        let created = harness.publisher.events_on(Topic::MessageCreated).await;
        assert_eq!(created.len(), 2);
        // Only the senders with a storable message got a conversation.
        let conversations = pipeline.resolver().list_active("org-test").await.unwrap();
        assert_eq!(conversations.len(), 2);
        let contents: Vec<_> = conversations
            .iter()
            .filter_map(|c| c.last_message_content.clone())
            .collect();
        assert!(contents.contains(&"hello".to_string()));
        assert!(contents.iter().any(|c| c.contains("where is it?")));
    }

    #[tokio::test]
    async fn blank_message_is_rejected_before_resolving() {
        let harness = TestHarness::new().await.unwrap();
        let pipeline = pipeline(&harness);
        let event = WebhookEvent::pending("org-test", "wa-test", "whatsapp", &serde_json::json!({}));
        let blank = CanonicalMessage {
            origin: "628".into(),
            content: "  ".into(),
            media_url: None,
            message_type: MessageType::Text,
            metadata: serde_json::Map::new(),
            platform_message_id: None,
            sender_name: None,
            timestamp: None,
        };

        let err = pipeline.ingest_message(&event, blank.clone()).await.unwrap_err();
        assert!(matches!(err, ParleyError::Validation(_)));
        assert!(pipeline.resolver().list_active("org-test").await.unwrap().is_empty());

        // Through the sink the blank message is dropped and its siblings kept.
        let mut kept = blank;
        kept.content = "still here".into();
        let blank_again = CanonicalMessage { content: String::new(), ..kept.clone() };
        pipeline.deliver(&event, vec![blank_again, kept]).await.unwrap();
        assert_eq!(harness.publisher.events_on(Topic::MessageCreated).await.len(), 1);
    }

    #[tokio::test]
    async fn ai_response_becomes_outbound_message() {
        let harness = TestHarness::new().await.unwrap();
        let pipeline = pipeline(&harness);
        let intake = intake(&harness, pipeline.clone());
        intake
            .receive(
                "whatsapp",
                "org-test",
                "wa-test",
                &fixtures::whatsapp_text("628", "wamid.q", "where is my order?"),
            )
            .await
            .unwrap();
        let created = harness.publisher.events_on(Topic::MessageCreated).await;
        let conversation = pipeline
            .resolver()
            .get(created[0].conversation_id.as_deref().unwrap())
            .await
            .unwrap();

        let response = EventEnvelope::ai_response(
            &conversation,
            created[0].message_id.as_deref(),
            "It ships today.",
            Some(0.92),
        );
        let reply = pipeline.handle_ai_response(&response).await.unwrap();
        assert_eq!(reply.direction, Direction::Outbound);
        assert_eq!(reply.sender_type, SenderType::Ai);
        assert!(reply.is_ai_generated);
        assert_eq!(reply.ai_confidence, Some(0.92));
        assert_eq!(reply.message_type, MessageType::Text);

        let again = pipeline.handle_ai_response(&response).await.unwrap();
        assert_eq!(again.id, reply.id);

        let deliveries = harness.publisher.events_on(Topic::MessageDelivery).await;
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].message_id.as_deref(), Some(reply.id.as_str()));
        assert_eq!(deliveries[0].event_id, deliveries[1].event_id);

        let refreshed = pipeline.resolver().get(&conversation.id).await.unwrap();
        assert!(refreshed.last_ai_message_at.is_some());
        assert_eq!(refreshed.last_message_by_type, Some(SenderType::Ai));
    }

    #[tokio::test]
    async fn ai_response_for_missing_conversation_is_not_found() {
        let harness = TestHarness::new().await.unwrap();
        let pipeline = pipeline(&harness);
        let mut orphan = parley_core::types::Conversation::open(&ConversationKey {
            organization_id: "org-test".into(),
            user_id: "user-test".into(),
            contact_id: "c".into(),
            medium_id: "wa-test".into(),
        });
        orphan.id = "missing".into();
        let response = EventEnvelope::ai_response(&orphan, None, "hi", None);
        assert!(pipeline.handle_ai_response(&response).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn wrong_event_kind_is_rejected() {
        let harness = TestHarness::new().await.unwrap();
        let pipeline = pipeline(&harness);
        let event = WebhookEvent::pending("org-test", "wa-test", "whatsapp", &serde_json::json!({}));
        let err = pipeline
            .handle_ai_response(&EventEnvelope::webhook_received(&event))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Validation(_)));
    }

    #[tokio::test]
    async fn delivery_status_codes_drive_lifecycle() {
        let harness = TestHarness::new().await.unwrap();
        let pipeline = pipeline(&harness);
        let intake = intake(&harness, pipeline.clone());
        intake
            .receive("whatsapp", "org-test", "wa-test", &fixtures::whatsapp_text("628", "wamid.s", "hi"))
            .await
            .unwrap();
        let created = harness.publisher.events_on(Topic::MessageCreated).await;
        let id = created[0].message_id.clone().unwrap();

        assert_eq!(
            pipeline.report_delivery_status(&id, 2, None).await.unwrap(),
            StatusTransition::Applied
        );
        assert_eq!(
            pipeline.report_delivery_status(&id, 2, None).await.unwrap(),
            StatusTransition::Unchanged
        );
        assert_eq!(
            pipeline.report_delivery_status(&id, 1, None).await.unwrap(),
            StatusTransition::Ignored
        );
        let err = pipeline.report_delivery_status(&id, 9, None).await.unwrap_err();
        assert!(matches!(err, ParleyError::Validation(_)));
        assert!(pipeline
            .report_delivery_status("missing", 3, None)
            .await
            .unwrap_err()
            .is_not_found());
    }
}
