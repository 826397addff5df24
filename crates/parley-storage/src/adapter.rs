// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter and ContactDirectory traits.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use parley_config::model::StorageConfig;
use parley_core::types::{
    ContactRef, Conversation, ConversationInsert, ConversationKey, ConversationPriority,
    ConversationStatus, LastMessageSummary, Message, MessageInsert, MessageStatus, Platform,
    StatusChange, WebhookEvent, WebhookStatus,
};
use parley_core::{
    AdapterType, ContactDirectory, HealthStatus, ParleyError, PluginAdapter, StorageAdapter,
};

use crate::database::Database;
use crate::models::QueueEntry;
use crate::queries;
use crate::queries::contacts::Medium;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    ///
    /// [`initialize`]: StorageAdapter::initialize
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wraps an already opened database.
    pub fn from_database(config: StorageConfig, db: Database) -> Self {
        Self {
            config,
            db: OnceCell::from(db),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    pub fn db(&self) -> Result<&Database, ParleyError> {
        self.db
            .get()
            .ok_or_else(|| ParleyError::storage("storage not initialized -- call initialize() first"))
    }

    // --- Outbox queue ---

    pub async fn enqueue(&self, queue_name: &str, payload: &str) -> Result<i64, ParleyError> {
        queries::queue::enqueue(self.db()?, queue_name, payload).await
    }

    pub async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, ParleyError> {
        queries::queue::dequeue(self.db()?, queue_name).await
    }

    pub async fn ack(&self, id: i64) -> Result<(), ParleyError> {
        queries::queue::ack(self.db()?, id).await
    }

    /// Returns whether the entry has exhausted its attempts.
    pub async fn fail(&self, id: i64) -> Result<bool, ParleyError> {
        queries::queue::fail(self.db()?, id).await
    }

    /// Fails an entry permanently regardless of its remaining attempts.
    pub async fn bury(&self, id: i64) -> Result<(), ParleyError> {
        queries::queue::bury(self.db()?, id).await
    }

    pub async fn queue_stats(&self) -> Result<Vec<(String, String, i64)>, ParleyError> {
        queries::queue::stats(self.db()?).await
    }

    // --- Operator views ---

    pub async fn webhook_counts(&self) -> Result<Vec<(WebhookStatus, i64)>, ParleyError> {
        queries::webhook_events::count_by_status(self.db()?).await
    }

    /// Every conversation row for `key`, including inactive ones.
    pub async fn conversation_count(&self, key: &ConversationKey) -> Result<i64, ParleyError> {
        queries::conversations::count_for_key(self.db()?, key).await
    }

    pub async fn get_medium(&self, medium_id: &str) -> Result<Option<Medium>, ParleyError> {
        queries::contacts::get_medium(self.db()?, medium_id).await
    }

    async fn checkpoint(&self) -> Result<(), ParleyError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        if self.db.get().is_some() {
            self.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        let path = self.config.database_path.clone();
        let db = Database::open_with_options(&path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| ParleyError::storage("storage already initialized"))?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        self.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Webhook events ---

    async fn insert_webhook_event(&self, event: &WebhookEvent) -> Result<(), ParleyError> {
        queries::webhook_events::insert_webhook_event(self.db()?, event).await
    }

    async fn get_webhook_event(&self, id: &str) -> Result<Option<WebhookEvent>, ParleyError> {
        queries::webhook_events::get_webhook_event(self.db()?, id).await
    }

    async fn mark_webhook_processed(&self, id: &str) -> Result<WebhookEvent, ParleyError> {
        queries::webhook_events::mark_processed(self.db()?, id).await
    }

    async fn mark_webhook_failed(
        &self,
        id: &str,
        error: &str,
    ) -> Result<WebhookEvent, ParleyError> {
        queries::webhook_events::mark_failed(self.db()?, id, error).await
    }

    async fn record_webhook_retry(
        &self,
        id: &str,
        error: &str,
        max_retries: i64,
    ) -> Result<WebhookEvent, ParleyError> {
        queries::webhook_events::record_retry(self.db()?, id, error, max_retries).await
    }

    async fn list_pending_webhook_events(
        &self,
        limit: i64,
    ) -> Result<Vec<WebhookEvent>, ParleyError> {
        queries::webhook_events::list_pending(self.db()?, limit).await
    }

    // --- Conversations ---

    async fn find_active_conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<Conversation>, ParleyError> {
        queries::conversations::find_active(self.db()?, key).await
    }

    async fn insert_active_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<ConversationInsert, ParleyError> {
        queries::conversations::insert_active(self.db()?, conversation).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, ParleyError> {
        queries::conversations::get(self.db()?, id).await
    }

    async fn activate_conversation(&self, id: &str) -> Result<Conversation, ParleyError> {
        queries::conversations::activate(self.db()?, id).await
    }

    async fn set_conversation_status(
        &self,
        id: &str,
        status: ConversationStatus,
    ) -> Result<Conversation, ParleyError> {
        queries::conversations::set_status(self.db()?, id, status).await
    }

    async fn set_conversation_priority(
        &self,
        id: &str,
        priority: ConversationPriority,
    ) -> Result<Conversation, ParleyError> {
        queries::conversations::set_priority(self.db()?, id, priority).await
    }

    async fn archive_conversation(&self, id: &str) -> Result<Conversation, ParleyError> {
        queries::conversations::archive(self.db()?, id).await
    }

    async fn soft_delete_conversation(&self, id: &str) -> Result<Conversation, ParleyError> {
        queries::conversations::soft_delete(self.db()?, id).await
    }

    async fn list_active_conversations(
        &self,
        organization_id: &str,
    ) -> Result<Vec<Conversation>, ParleyError> {
        queries::conversations::list_active(self.db()?, organization_id).await
    }

    // --- Messages ---

    async fn insert_message(
        &self,
        message: &Message,
        summary: &LastMessageSummary,
    ) -> Result<MessageInsert, ParleyError> {
        queries::messages::insert_message(self.db()?, message, summary).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, ParleyError> {
        queries::messages::get_message(self.db()?, id).await
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, ParleyError> {
        queries::messages::get_messages_for_conversation(self.db()?, conversation_id, limit).await
    }

    async fn compare_and_set_message_status(
        &self,
        id: &str,
        expected: MessageStatus,
        change: &StatusChange,
    ) -> Result<bool, ParleyError> {
        queries::messages::compare_and_set_status(self.db()?, id, expected, change).await
    }
}

#[async_trait]
impl ContactDirectory for SqliteStorage {
    async fn register_medium(
        &self,
        medium_id: &str,
        organization_id: &str,
        user_id: &str,
        platform: Platform,
    ) -> Result<(), ParleyError> {
        queries::contacts::register_medium(self.db()?, medium_id, organization_id, user_id, platform)
            .await
    }

    async fn resolve_contact(
        &self,
        organization_id: &str,
        medium_id: &str,
        origin: &str,
        display_name: Option<&str>,
    ) -> Result<ContactRef, ParleyError> {
        queries::contacts::resolve_contact(
            self.db()?,
            organization_id,
            medium_id,
            origin,
            display_name,
        )
        .await
    }
}
