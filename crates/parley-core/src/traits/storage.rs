// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends (SQLite, etc.).

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Conversation, ConversationInsert, ConversationKey, ConversationPriority, ConversationStatus,
    LastMessageSummary, Message, MessageInsert, MessageStatus, StatusChange, WebhookEvent,
};

/// Adapter for storage and persistence backends.
///
/// The pipeline stages own the decisions (retry budgets, status ordering,
/// denormalized summaries); the store owns atomicity. Every method that the
/// pipeline relies on for an invariant executes as one transaction.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), ParleyError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), ParleyError>;

    // --- Webhook events ---

    async fn insert_webhook_event(&self, event: &WebhookEvent) -> Result<(), ParleyError>;

    async fn get_webhook_event(&self, id: &str) -> Result<Option<WebhookEvent>, ParleyError>;

    /// Moves a `pending` event to `processed` and stamps `processed_at`.
    async fn mark_webhook_processed(&self, id: &str) -> Result<WebhookEvent, ParleyError>;

    /// Moves a `pending` event to `failed` without touching the retry count.
    async fn mark_webhook_failed(&self, id: &str, error: &str)
    -> Result<WebhookEvent, ParleyError>;

    /// Increments the retry count and stores `error`. The event stays
    /// `pending` until the count reaches `max_retries`, then becomes `failed`.
    /// Processed events are never modified.
    async fn record_webhook_retry(
        &self,
        id: &str,
        error: &str,
        max_retries: i64,
    ) -> Result<WebhookEvent, ParleyError>;

    /// Oldest-first `pending` events.
    async fn list_pending_webhook_events(
        &self,
        limit: i64,
    ) -> Result<Vec<WebhookEvent>, ParleyError>;

    // --- Conversations ---

    /// The active conversation for `key`, if any.
    async fn find_active_conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<Conversation>, ParleyError>;

    /// Inserts `conversation` as the active row for its key if no active row
    /// exists, and deactivates every other conversation sharing the key, all
    /// in one transaction.
    async fn insert_active_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<ConversationInsert, ParleyError>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, ParleyError>;

    /// Makes `id` the active conversation for its key, deactivating siblings.
    async fn activate_conversation(&self, id: &str) -> Result<Conversation, ParleyError>;

    async fn set_conversation_status(
        &self,
        id: &str,
        status: ConversationStatus,
    ) -> Result<Conversation, ParleyError>;

    async fn set_conversation_priority(
        &self,
        id: &str,
        priority: ConversationPriority,
    ) -> Result<Conversation, ParleyError>;

    /// Archives and deactivates the conversation.
    async fn archive_conversation(&self, id: &str) -> Result<Conversation, ParleyError>;

    /// Soft-deletes and deactivates the conversation.
    async fn soft_delete_conversation(&self, id: &str) -> Result<Conversation, ParleyError>;

    /// Active, non-deleted conversations of an organization, most recent
    /// activity first.
    async fn list_active_conversations(
        &self,
        organization_id: &str,
    ) -> Result<Vec<Conversation>, ParleyError>;

    // --- Messages ---

    /// Inserts `message` and applies `summary` to its conversation in one
    /// transaction. A message whose `(conversation_id, platform_message_id)`
    /// already exists is returned as [`MessageInsert::Existing`] and nothing
    /// is written. The summary only applies when it is not older than the
    /// conversation's current `last_message_at`.
    async fn insert_message(
        &self,
        message: &Message,
        summary: &LastMessageSummary,
    ) -> Result<MessageInsert, ParleyError>;

    async fn get_message(&self, id: &str) -> Result<Option<Message>, ParleyError>;

    /// Messages of a conversation in `created_at` order.
    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, ParleyError>;

    /// Applies `change` only if the message still has status `expected`.
    /// Returns `false` when another writer changed the status first.
    async fn compare_and_set_message_status(
        &self,
        id: &str,
        expected: MessageStatus,
        change: &StatusChange,
    ) -> Result<bool, ParleyError>;
}
