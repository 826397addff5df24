// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain events exchanged between the ingestion pipeline and its asynchronous
//! consumers (AI responder, delivery worker).
//!
//! Every envelope carries an `event_id` that consumers deduplicate on. Events
//! about a stored entity get a deterministic id derived from the topic and the
//! entity id, so republishing after a retry yields the same `event_id`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::ParleyError;
use crate::types::{
    now_timestamp, Conversation, Direction, Message, MessageType, SenderType, WebhookEvent,
};

/// Named channels events are published on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    WebhookReceived,
    MessageCreated,
    AiResponseReceived,
    MessageDelivery,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::WebhookReceived,
        Topic::MessageCreated,
        Topic::AiResponseReceived,
        Topic::MessageDelivery,
    ];
}

/// Topic-specific body of an [`EventEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    WebhookReceived {
        webhook_event_id: String,
        platform: String,
        medium_id: String,
    },
    MessageCreated {
        direction: Direction,
        sender_type: SenderType,
        message_type: MessageType,
        content: String,
        platform_message_id: Option<String>,
    },
    AiResponseReceived {
        content: String,
        message_type: MessageType,
        media_url: Option<String>,
        confidence: Option<f64>,
        /// The message the responder answered.
        in_reply_to: Option<String>,
    },
    MessageDelivery {
        medium_id: String,
        message_type: MessageType,
        content: String,
        media_url: Option<String>,
    },
}

/// A JSON-serializable event as it travels over a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub topic: Topic,
    pub organization_id: String,
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
    pub contact_id: Option<String>,
    pub created_at: String,
    pub payload: EventPayload,
}

fn entity_event_id(topic: Topic, entity_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{topic}:{entity_id}").as_bytes()).to_string()
}

impl EventEnvelope {
    /// Announces a webhook delivery that has been durably stored.
    pub fn webhook_received(event: &WebhookEvent) -> Self {
        Self {
            event_id: entity_event_id(Topic::WebhookReceived, &event.id),
            topic: Topic::WebhookReceived,
            organization_id: event.organization_id.clone(),
            conversation_id: None,
            message_id: None,
            contact_id: None,
            created_at: now_timestamp(),
            payload: EventPayload::WebhookReceived {
                webhook_event_id: event.id.clone(),
                platform: event.platform.clone(),
                medium_id: event.medium_id.clone(),
            },
        }
    }

    /// Hands a newly stored message to the AI responder.
    pub fn message_created(message: &Message, conversation: &Conversation) -> Self {
        Self {
            event_id: entity_event_id(Topic::MessageCreated, &message.id),
            topic: Topic::MessageCreated,
            organization_id: message.organization_id.clone(),
            conversation_id: Some(message.conversation_id.clone()),
            message_id: Some(message.id.clone()),
            contact_id: Some(conversation.contact_id.clone()),
            created_at: now_timestamp(),
            payload: EventPayload::MessageCreated {
                direction: message.direction,
                sender_type: message.sender_type,
                message_type: message.message_type,
                content: message.content.clone(),
                platform_message_id: message.platform_message_id.clone(),
            },
        }
    }

    /// What an AI responder emits after answering `in_reply_to`.
    pub fn ai_response(
        conversation: &Conversation,
        in_reply_to: Option<&str>,
        content: &str,
        confidence: Option<f64>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            topic: Topic::AiResponseReceived,
            organization_id: conversation.organization_id.clone(),
            conversation_id: Some(conversation.id.clone()),
            message_id: in_reply_to.map(str::to_string),
            contact_id: Some(conversation.contact_id.clone()),
            created_at: now_timestamp(),
            payload: EventPayload::AiResponseReceived {
                content: content.to_string(),
                message_type: MessageType::Text,
                media_url: None,
                confidence,
                in_reply_to: in_reply_to.map(str::to_string),
            },
        }
    }

    /// Asks the delivery worker to push an outbound message to its platform.
    pub fn message_delivery(message: &Message, conversation: &Conversation) -> Self {
        Self {
            event_id: entity_event_id(Topic::MessageDelivery, &message.id),
            topic: Topic::MessageDelivery,
            organization_id: message.organization_id.clone(),
            conversation_id: Some(message.conversation_id.clone()),
            message_id: Some(message.id.clone()),
            contact_id: Some(conversation.contact_id.clone()),
            created_at: now_timestamp(),
            payload: EventPayload::MessageDelivery {
                medium_id: conversation.medium_id.clone(),
                message_type: message.message_type,
                content: message.content.clone(),
                media_url: message.media_url.clone(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, ParleyError> {
        serde_json::to_string(self)
            .map_err(|e| ParleyError::Internal(format!("failed to encode event: {e}")))
    }

    pub fn from_json(raw: &str) -> Result<Self, ParleyError> {
        serde_json::from_str(raw)
            .map_err(|e| ParleyError::Validation(format!("malformed event envelope: {e}")))
    }
}
