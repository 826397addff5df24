// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across adapter traits and pipeline stages.
//!
//! Persisted entities keep timestamps as ISO 8601 strings with millisecond
//! precision (`2026-01-01T00:00:00.000Z`) so they sort lexicographically in
//! SQLite and on the wire.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ParleyError;

/// Formats a UTC instant the way every persisted timestamp is stored.
pub fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Current time in the persisted timestamp format.
pub fn now_timestamp() -> String {
    format_timestamp(chrono::Utc::now())
}

/// Converts a Unix epoch (seconds) into the persisted timestamp format.
pub fn timestamp_from_unix_secs(secs: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(secs, 0).map(format_timestamp)
}

/// Converts a Unix epoch (milliseconds) into the persisted timestamp format.
pub fn timestamp_from_unix_millis(millis: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(millis).map(format_timestamp)
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Publisher,
}

/// A messaging platform a webhook can originate from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    WhatsApp,
    Instagram,
    Facebook,
    Email,
}

impl Platform {
    /// All supported platforms, in registration order.
    pub const ALL: [Platform; 4] = [
        Platform::WhatsApp,
        Platform::Instagram,
        Platform::Facebook,
        Platform::Email,
    ];
}

/// Canonical message content classification.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

/// Who authored a message.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    #[default]
    Customer,
    Agent,
    Ai,
    System,
}

/// Whether a message came in from a contact or goes out to one.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Inbound,
    Outbound,
}

/// Processing state of a stored webhook delivery.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Pending,
    Processed,
    Failed,
}

/// Workflow status of a conversation.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Open,
    Closed,
    Pending,
    Resolved,
}

/// Triage priority of a conversation.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Delivery lifecycle status of a message.
///
/// The ordinal codes are part of the wire contract with delivery-status
/// callbacks and are what the store persists.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Wire ordinal: `pending=0, sent=1, delivered=2, read=3, failed=4`.
    pub fn code(self) -> i64 {
        match self {
            MessageStatus::Pending => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Read => 3,
            MessageStatus::Failed => 4,
        }
    }

    /// Parses a wire ordinal.
    pub fn from_code(code: i64) -> Result<Self, ParleyError> {
        match code {
            0 => Ok(MessageStatus::Pending),
            1 => Ok(MessageStatus::Sent),
            2 => Ok(MessageStatus::Delivered),
            3 => Ok(MessageStatus::Read),
            4 => Ok(MessageStatus::Failed),
            other => Err(ParleyError::Validation(format!(
                "unknown message status code {other}"
            ))),
        }
    }

    /// `read` and `failed` end the lifecycle; nothing moves a message out of them.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Read | MessageStatus::Failed)
    }
}

impl TryFrom<i64> for MessageStatus {
    type Error = ParleyError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        MessageStatus::from_code(code)
    }
}

/// The platform-independent output of a normalizer. Never persisted directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    /// Phone number, platform user id, or email address of the sender.
    pub origin: String,
    pub content: String,
    pub media_url: Option<String>,
    pub message_type: MessageType,
    /// Platform-qualified keys (`whatsapp_message_id`, `email_subject`, ...).
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Platform-native message id, used for correlation and idempotency.
    pub platform_message_id: Option<String>,
    pub sender_name: Option<String>,
    /// When the platform says the message was sent.
    pub timestamp: Option<String>,
}

/// One durable record per inbound webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub organization_id: String,
    pub medium_id: String,
    /// Raw platform tag as received; may name a platform nobody registered.
    pub platform: String,
    /// JSON text of the raw payload.
    pub payload: String,
    pub status: WebhookStatus,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub processed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl WebhookEvent {
    /// Builds a fresh `pending` event for a delivery that has just arrived.
    pub fn pending(
        organization_id: &str,
        medium_id: &str,
        platform: &str,
        payload: &serde_json::Value,
    ) -> Self {
        let now = now_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            medium_id: medium_id.to_string(),
            platform: platform.to_string(),
            payload: payload.to_string(),
            status: WebhookStatus::Pending,
            error_message: None,
            retry_count: 0,
            processed_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// The scoping tuple of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub organization_id: String,
    pub user_id: String,
    pub contact_id: String,
    pub medium_id: String,
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.organization_id, self.user_id, self.contact_id, self.medium_id
        )
    }
}

/// A thread scoped to (organization, user, contact, medium).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub organization_id: String,
    pub user_id: String,
    pub contact_id: String,
    pub medium_id: String,
    pub is_active: bool,
    pub is_archived: bool,
    pub is_deleted: bool,
    pub status: ConversationStatus,
    pub priority: ConversationPriority,
    pub ai_enabled: bool,
    /// JSON text.
    pub ai_config: Option<String>,
    /// JSON text.
    pub metadata: Option<String>,
    pub last_message_at: Option<String>,
    pub last_message_by_id: Option<String>,
    pub last_message_by_type: Option<SenderType>,
    pub last_message_by_name: Option<String>,
    pub last_message_content: Option<String>,
    pub last_message_type: Option<MessageType>,
    pub last_message_media_url: Option<String>,
    pub last_human_message_at: Option<String>,
    pub last_ai_message_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    /// A new, active, open conversation for `key` with no messages yet.
    pub fn open(key: &ConversationKey) -> Self {
        let now = now_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: key.organization_id.clone(),
            user_id: key.user_id.clone(),
            contact_id: key.contact_id.clone(),
            medium_id: key.medium_id.clone(),
            is_active: true,
            is_archived: false,
            is_deleted: false,
            status: ConversationStatus::Open,
            priority: ConversationPriority::Normal,
            ai_enabled: true,
            ai_config: None,
            metadata: None,
            last_message_at: None,
            last_message_by_id: None,
            last_message_by_type: None,
            last_message_by_name: None,
            last_message_content: None,
            last_message_type: None,
            last_message_media_url: None,
            last_human_message_at: None,
            last_ai_message_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn key(&self) -> ConversationKey {
        ConversationKey {
            organization_id: self.organization_id.clone(),
            user_id: self.user_id.clone(),
            contact_id: self.contact_id.clone(),
            medium_id: self.medium_id.clone(),
        }
    }
}

/// Outcome of the atomic insert-if-absent on the active-conversation key.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationInsert {
    /// The row was inserted and sibling conversations were deactivated.
    Inserted(Conversation),
    /// Another writer holds the active slot for this key.
    Conflict,
}

/// A stored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub organization_id: String,
    pub sender_type: SenderType,
    pub sender_id: Option<String>,
    pub direction: Direction,
    pub message_type: MessageType,
    pub content: String,
    pub media_url: Option<String>,
    /// JSON text.
    pub attachments: Option<String>,
    pub is_broadcast: bool,
    pub is_order: bool,
    pub is_ai_generated: bool,
    pub ai_confidence: Option<f64>,
    pub status: MessageStatus,
    pub platform_message_id: Option<String>,
    /// JSON text.
    pub metadata: Option<String>,
    pub read_at: Option<String>,
    pub delivered_at: Option<String>,
    pub failed_at: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for message creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewMessage {
    pub conversation_id: String,
    pub organization_id: String,
    pub direction: Direction,
    pub sender_type: SenderType,
    pub sender_id: Option<String>,
    pub sender_name: Option<String>,
    pub message_type: MessageType,
    pub content: String,
    pub media_url: Option<String>,
    pub attachments: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub platform_message_id: Option<String>,
    pub is_broadcast: bool,
    pub is_order: bool,
    pub is_ai_generated: bool,
    pub ai_confidence: Option<f64>,
    /// Defaults to "now" when absent.
    pub created_at: Option<String>,
}

/// Denormalized "last message" fields written onto the conversation together
/// with the message insert.
#[derive(Debug, Clone, PartialEq)]
pub struct LastMessageSummary {
    pub at: String,
    pub by_id: Option<String>,
    pub by_type: SenderType,
    pub by_name: Option<String>,
    pub content_preview: String,
    pub message_type: MessageType,
    pub media_url: Option<String>,
    /// Set for inbound human messages.
    pub human_message_at: Option<String>,
    /// Set for AI-generated messages.
    pub ai_message_at: Option<String>,
}

/// Outcome of an idempotent message insert.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageInsert {
    Created(Message),
    /// A message with the same `(conversation_id, platform_message_id)` exists.
    Existing(Message),
}

impl MessageInsert {
    pub fn message(&self) -> &Message {
        match self {
            MessageInsert::Created(m) | MessageInsert::Existing(m) => m,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            MessageInsert::Created(m) | MessageInsert::Existing(m) => m,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, MessageInsert::Created(_))
    }
}

/// Column values written by one status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: MessageStatus,
    pub delivered_at: Option<String>,
    pub read_at: Option<String>,
    pub failed_at: Option<String>,
    pub failure_reason: Option<String>,
    pub updated_at: String,
}

/// What an `update_status` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// The message moved forward and the matching timestamp was stamped.
    Applied,
    /// The message already had this status.
    Unchanged,
    /// The transition would have moved the message backward, or out of a
    /// terminal status, and was dropped.
    Ignored,
}

/// A sender resolved to the business user owning the medium and a contact row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRef {
    pub user_id: String,
    pub contact_id: String,
    pub display_name: Option<String>,
}
