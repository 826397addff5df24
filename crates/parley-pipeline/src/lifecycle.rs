// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message creation and the delivery-status state machine.
//!
//! ```text
//! pending(0) -> sent(1) -> delivered(2) -> read(3)
//!      \            \             \
//!       +------------+-------------+--> failed(4)
//! ```
//!
//! Forward moves may skip steps. `read` and `failed` are terminal. A move to
//! a lower ordinal is dropped and logged, since delivery callbacks arrive out
//! of order. Re-applying the current status is a successful no-op.

use std::sync::Arc;

use parley_core::types::{
    now_timestamp, Direction, LastMessageSummary, Message, MessageStatus, MessageType, NewMessage,
    SenderType, StatusChange, StatusTransition,
};
use parley_core::{ParleyError, StorageAdapter};
use tracing::{debug, info, warn};

/// Characters of content kept in a conversation's `last_message_content`.
pub const PREVIEW_CHARS: usize = 100;

/// Compare-and-set rounds before a status update gives up.
const MAX_STATUS_ATTEMPTS: usize = 5;

/// Stored when a `failed` transition arrives without a reason.
const DEFAULT_FAILURE_REASON: &str = "delivery failed";

pub struct MessageLifecycleManager {
    storage: Arc<dyn StorageAdapter>,
}

impl MessageLifecycleManager {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Stores a message and refreshes its conversation's last-message fields
    /// in the same transaction.
    ///
    /// New messages start `pending`. A message whose platform id is already
    /// stored in the conversation is returned as-is.
    pub async fn create_message(&self, new: NewMessage) -> Result<Message, ParleyError> {
        require_body(&new.content, new.media_url.as_deref())?;

        let now = now_timestamp();
        let created_at = new.created_at.clone().unwrap_or_else(|| now.clone());
        let summary = summarize(&new, &created_at);
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: new.conversation_id,
            organization_id: new.organization_id,
            sender_type: new.sender_type,
            sender_id: new.sender_id,
            direction: new.direction,
            message_type: new.message_type,
            content: new.content,
            media_url: new.media_url,
            attachments: new.attachments.map(|a| a.to_string()),
            is_broadcast: new.is_broadcast,
            is_order: new.is_order,
            is_ai_generated: new.is_ai_generated,
            ai_confidence: new.ai_confidence,
            status: MessageStatus::Pending,
            platform_message_id: new.platform_message_id,
            metadata: new.metadata.map(|m| m.to_string()),
            read_at: None,
            delivered_at: None,
            failed_at: None,
            failure_reason: None,
            created_at,
            updated_at: now,
        };

        let insert = self.storage.insert_message(&message, &summary).await?;
        if insert.was_created() {
            debug!(
                message_id = %message.id,
                conversation_id = %message.conversation_id,
                direction = %message.direction,
                "message created"
            );
        } else {
            debug!(
                message_id = %insert.message().id,
                platform_message_id = ?message.platform_message_id,
                "message already stored"
            );
        }
        Ok(insert.into_message())
    }

    pub async fn get_message(&self, id: &str) -> Result<Message, ParleyError> {
        self.storage
            .get_message(id)
            .await?
            .ok_or_else(|| ParleyError::not_found("message", id))
    }

    /// Messages of a conversation, oldest first.
    pub async fn list_messages(
        &self,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, ParleyError> {
        self.storage.list_messages(conversation_id, limit).await
    }

    /// Moves a message to `status`.
    ///
    /// Entering `delivered`, `read` or `failed` stamps the matching timestamp;
    /// `failed` also stores `failure_reason`.
    pub async fn update_status(
        &self,
        id: &str,
        status: MessageStatus,
        failure_reason: Option<&str>,
    ) -> Result<StatusTransition, ParleyError> {
        for _ in 0..MAX_STATUS_ATTEMPTS {
            let current = self.get_message(id).await?;
            let change = match plan_transition(current.status, status, failure_reason) {
                Plan::Unchanged => {
                    debug!(message_id = %id, status = %status, "status already applied");
                    return Ok(StatusTransition::Unchanged);
                }
                Plan::Ignored => {
                    warn!(
                        message_id = %id,
                        current = %current.status,
                        requested = %status,
                        "ignoring backward status transition"
                    );
                    return Ok(StatusTransition::Ignored);
                }
                Plan::Apply(change) => change,
            };
            if self
                .storage
                .compare_and_set_message_status(id, current.status, &change)
                .await?
            {
                info!(message_id = %id, from = %current.status, to = %status, "message status updated");
                return Ok(StatusTransition::Applied);
            }
            debug!(message_id = %id, "status changed concurrently, retrying");
        }
        Err(ParleyError::Internal(format!(
            "status of message {id} kept changing during update"
        )))
    }
}

enum Plan {
    Unchanged,
    Ignored,
    Apply(StatusChange),
}

fn plan_transition(
    current: MessageStatus,
    requested: MessageStatus,
    failure_reason: Option<&str>,
) -> Plan {
    if current == requested {
        return Plan::Unchanged;
    }
    if current.is_terminal() {
        return Plan::Ignored;
    }
    if requested != MessageStatus::Failed && requested.code() < current.code() {
        return Plan::Ignored;
    }

    let now = now_timestamp();
    let mut change = StatusChange {
        status: requested,
        delivered_at: None,
        read_at: None,
        failed_at: None,
        failure_reason: None,
        updated_at: now.clone(),
    };
    match requested {
        MessageStatus::Delivered => change.delivered_at = Some(now),
        MessageStatus::Read => change.read_at = Some(now),
        MessageStatus::Failed => {
            change.failed_at = Some(now);
            let reason = failure_reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or(DEFAULT_FAILURE_REASON);
            change.failure_reason = Some(reason.to_string());
        }
        MessageStatus::Pending | MessageStatus::Sent => {}
    }
    Plan::Apply(change)
}

/// A message must carry text or a media url.
pub(crate) fn require_body(content: &str, media_url: Option<&str>) -> Result<(), ParleyError> {
    if content.trim().is_empty() && media_url.is_none() {
        return Err(ParleyError::Validation(
            "message needs content or a media url".into(),
        ));
    }
    Ok(())
}

fn summarize(new: &NewMessage, at: &str) -> LastMessageSummary {
    let human = new.direction == Direction::Inbound && new.sender_type == SenderType::Customer;
    let ai = new.is_ai_generated || new.sender_type == SenderType::Ai;
    LastMessageSummary {
        at: at.to_string(),
        by_id: new.sender_id.clone(),
        by_type: new.sender_type,
        by_name: new.sender_name.clone(),
        content_preview: preview(&new.content, new.message_type),
        message_type: new.message_type,
        media_url: new.media_url.clone(),
        human_message_at: human.then(|| at.to_string()),
        ai_message_at: ai.then(|| at.to_string()),
    }
}

/// The first [`PREVIEW_CHARS`] characters of `content`, or a type label for
/// media without a caption.
pub fn preview(content: &str, message_type: MessageType) -> String {
    let content = content.trim();
    if content.is_empty() {
        return format!("[{message_type}]");
    }
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
