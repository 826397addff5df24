// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation resolution: one active conversation per
//! `(organization, user, contact, medium)`.
//!
//! Concurrent resolvers for the same key race on the store's conditional
//! insert. The loser observes [`ConversationInsert::Conflict`] and re-reads the
//! winner's row, so every caller ends up with the same conversation.

use std::sync::Arc;

use parley_core::types::{
    Conversation, ConversationInsert, ConversationKey, ConversationPriority, ConversationStatus,
};
use parley_core::{ParleyError, StorageAdapter};
use tracing::{debug, info, warn};

/// Attempts before giving up when the active slot keeps changing hands
/// between the conflict and the re-read.
const MAX_RESOLVE_ATTEMPTS: usize = 3;

pub struct ConversationResolver {
    storage: Arc<dyn StorageAdapter>,
}

impl ConversationResolver {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// The active conversation for `key`, created if none exists.
    pub async fn resolve(&self, key: &ConversationKey) -> Result<Conversation, ParleyError> {
        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            if let Some(existing) = self.storage.find_active_conversation(key).await? {
                return Ok(existing);
            }
            match self
                .storage
                .insert_active_conversation(&Conversation::open(key))
                .await?
            {
                ConversationInsert::Inserted(created) => {
                    info!(
                        conversation_id = %created.id,
                        organization_id = %key.organization_id,
                        contact_id = %key.contact_id,
                        medium_id = %key.medium_id,
                        "conversation created"
                    );
                    return Ok(created);
                }
                ConversationInsert::Conflict => {
                    debug!(attempt, contact_id = %key.contact_id, "lost conversation insert race, re-reading");
                    if let Some(winner) = self.storage.find_active_conversation(key).await? {
                        return Ok(winner);
                    }
                }
            }
        }
        warn!(contact_id = %key.contact_id, medium_id = %key.medium_id, "active conversation kept changing");
        Err(ParleyError::Internal(format!(
            "could not resolve an active conversation for contact {} on medium {}",
            key.contact_id, key.medium_id
        )))
    }

    pub async fn get(&self, id: &str) -> Result<Conversation, ParleyError> {
        self.storage
            .get_conversation(id)
            .await?
            .ok_or_else(|| ParleyError::not_found("conversation", id))
    }

    /// Makes `id` the active conversation for its key, deactivating the rest.
    pub async fn reactivate(&self, id: &str) -> Result<Conversation, ParleyError> {
        let conversation = self.storage.activate_conversation(id).await?;
        info!(conversation_id = %id, "conversation reactivated");
        Ok(conversation)
    }

    pub async fn set_status(
        &self,
        id: &str,
        status: ConversationStatus,
    ) -> Result<Conversation, ParleyError> {
        self.storage.set_conversation_status(id, status).await
    }

    pub async fn set_priority(
        &self,
        id: &str,
        priority: ConversationPriority,
    ) -> Result<Conversation, ParleyError> {
        self.storage.set_conversation_priority(id, priority).await
    }

    /// Archives the conversation. The next message for its key opens a new one.
    pub async fn archive(&self, id: &str) -> Result<Conversation, ParleyError> {
        self.storage.archive_conversation(id).await
    }

    pub async fn soft_delete(&self, id: &str) -> Result<Conversation, ParleyError> {
        self.storage.soft_delete_conversation(id).await
    }

    pub async fn list_active(&self, organization_id: &str) -> Result<Vec<Conversation>, ParleyError> {
        self.storage.list_active_conversations(organization_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parley_core::types::{
        AdapterType, HealthStatus, LastMessageSummary, Message, MessageInsert, MessageStatus,
        StatusChange, WebhookEvent,
    };
    use parley_core::PluginAdapter;
    use parley_storage::SqliteStorage;
    use parley_test_utils::TestHarness;

    /// Delegates to SQLite, but its first active-conversation lookup reports
    /// nothing, as if it ran just before a concurrent insert committed.
    struct StaleFirstRead {
        inner: Arc<SqliteStorage>,
        missed: AtomicBool,
        inserts: AtomicUsize,
        conflicts: AtomicUsize,
    }

    impl StaleFirstRead {
        fn new(inner: Arc<SqliteStorage>) -> Self {
            Self {
                inner,
                missed: AtomicBool::new(false),
                inserts: AtomicUsize::new(0),
                conflicts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PluginAdapter for StaleFirstRead {
        fn name(&self) -> &str {
            "stale-first-read"
        }

        fn version(&self) -> semver::Version {
            self.inner.version()
        }

        fn adapter_type(&self) -> AdapterType {
            AdapterType::Storage
        }

        async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
            self.inner.health_check().await
        }

        async fn shutdown(&self) -> Result<(), ParleyError> {
            Ok(())
        }
    }

    #[async_trait]
    impl StorageAdapter for StaleFirstRead {
        async fn initialize(&self) -> Result<(), ParleyError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), ParleyError> {
            Ok(())
        }

        async fn insert_webhook_event(&self, event: &WebhookEvent) -> Result<(), ParleyError> {
            self.inner.insert_webhook_event(event).await
        }

        async fn get_webhook_event(&self, id: &str) -> Result<Option<WebhookEvent>, ParleyError> {
            self.inner.get_webhook_event(id).await
        }

        async fn mark_webhook_processed(&self, id: &str) -> Result<WebhookEvent, ParleyError> {
            self.inner.mark_webhook_processed(id).await
        }

        async fn mark_webhook_failed(
            &self,
            id: &str,
            error: &str,
        ) -> Result<WebhookEvent, ParleyError> {
            self.inner.mark_webhook_failed(id, error).await
        }

        async fn record_webhook_retry(
            &self,
            id: &str,
            error: &str,
            max_retries: i64,
        ) -> Result<WebhookEvent, ParleyError> {
            self.inner.record_webhook_retry(id, error, max_retries).await
        }

        async fn list_pending_webhook_events(
            &self,
            limit: i64,
        ) -> Result<Vec<WebhookEvent>, ParleyError> {
            self.inner.list_pending_webhook_events(limit).await
        }

        async fn find_active_conversation(
            &self,
            key: &ConversationKey,
        ) -> Result<Option<Conversation>, ParleyError> {
            if !self.missed.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_active_conversation(key).await
        }

        async fn insert_active_conversation(
            &self,
            conversation: &Conversation,
        ) -> Result<ConversationInsert, ParleyError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            let outcome = self.inner.insert_active_conversation(conversation).await?;
            if outcome == ConversationInsert::Conflict {
                self.conflicts.fetch_add(1, Ordering::SeqCst);
            }
            Ok(outcome)
        }

        async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, ParleyError> {
            self.inner.get_conversation(id).await
        }

        async fn activate_conversation(&self, id: &str) -> Result<Conversation, ParleyError> {
            self.inner.activate_conversation(id).await
        }

        async fn set_conversation_status(
            &self,
            id: &str,
            status: ConversationStatus,
        ) -> Result<Conversation, ParleyError> {
            self.inner.set_conversation_status(id, status).await
        }

        async fn set_conversation_priority(
            &self,
            id: &str,
            priority: ConversationPriority,
        ) -> Result<Conversation, ParleyError> {
            self.inner.set_conversation_priority(id, priority).await
        }

        async fn archive_conversation(&self, id: &str) -> Result<Conversation, ParleyError> {
            self.inner.archive_conversation(id).await
        }

        async fn soft_delete_conversation(&self, id: &str) -> Result<Conversation, ParleyError> {
            self.inner.soft_delete_conversation(id).await
        }

        async fn list_active_conversations(
            &self,
            organization_id: &str,
        ) -> Result<Vec<Conversation>, ParleyError> {
            self.inner.list_active_conversations(organization_id).await
        }

        async fn insert_message(
            &self,
            message: &Message,
            summary: &LastMessageSummary,
        ) -> Result<MessageInsert, ParleyError> {
            self.inner.insert_message(message, summary).await
        }

        async fn get_message(&self, id: &str) -> Result<Option<Message>, ParleyError> {
            self.inner.get_message(id).await
        }

        async fn list_messages(
            &self,
            conversation_id: &str,
            limit: Option<i64>,
        ) -> Result<Vec<Message>, ParleyError> {
            self.inner.list_messages(conversation_id, limit).await
        }

        async fn compare_and_set_message_status(
            &self,
            id: &str,
            expected: MessageStatus,
            change: &StatusChange,
        ) -> Result<bool, ParleyError> {
            self.inner.compare_and_set_message_status(id, expected, change).await
        }
    }

    fn key(contact: &str) -> ConversationKey {
        ConversationKey {
            organization_id: "org-1".into(),
            user_id: "user-1".into(),
            contact_id: contact.into(),
            medium_id: "wa-1".into(),
        }
    }

    async fn resolver() -> (ConversationResolver, TestHarness) {
        let harness = TestHarness::new().await.unwrap();
        (ConversationResolver::new(harness.storage_adapter()), harness)
    }

    #[tokio::test]
    async fn resolve_is_get_or_create() {
        let (resolver, _h) = resolver().await;
        let first = resolver.resolve(&key("c-1")).await.unwrap();
        let second = resolver.resolve(&key("c-1")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.is_active);

        let other = resolver.resolve(&key("c-2")).await.unwrap();
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_conversation() {
        let (resolver, harness) = resolver().await;
        let resolver = Arc::new(resolver);
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.resolve(&key("c-race")).await })
            })
            .collect();

        let mut ids = Vec::new();
        for task in futures::future::join_all(tasks).await {
            ids.push(task.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "every resolver must see the same conversation");
        assert_eq!(resolver.list_active("org-1").await.unwrap().len(), 1);
        assert_eq!(harness.storage.conversation_count(&key("c-race")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lost_insert_race_returns_the_winner() {
        let harness = TestHarness::new().await.unwrap();
        let winner = ConversationResolver::new(harness.storage_adapter())
            .resolve(&key("c-late"))
            .await
            .unwrap();

        // The first lookup misses the row the other resolver just committed,
        // so this resolver inserts, hits the conflict and re-reads.
        let stale = Arc::new(StaleFirstRead::new(harness.storage.clone()));
        let loser = ConversationResolver::new(stale.clone());
        let resolved = loser.resolve(&key("c-late")).await.unwrap();

        assert_eq!(resolved.id, winner.id);
        assert_eq!(stale.inserts.load(Ordering::SeqCst), 1);
        assert_eq!(stale.conflicts.load(Ordering::SeqCst), 1);
        assert_eq!(harness.storage.conversation_count(&key("c-late")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn archive_opens_a_fresh_conversation() {
        let (resolver, _h) = resolver().await;
        let first = resolver.resolve(&key("c-1")).await.unwrap();
        let archived = resolver.archive(&first.id).await.unwrap();
        assert!(archived.is_archived);
        assert!(!archived.is_active);

        let second = resolver.resolve(&key("c-1")).await.unwrap();
        assert_ne!(first.id, second.id);

        let back = resolver.reactivate(&first.id).await.unwrap();
        assert!(back.is_active);
        assert!(!resolver.get(&second.id).await.unwrap().is_active);
        assert_eq!(resolver.resolve(&key("c-1")).await.unwrap().id, first.id);
    }

    #[tokio::test]
    async fn status_and_priority_updates() {
        let (resolver, _h) = resolver().await;
        let conversation = resolver.resolve(&key("c-1")).await.unwrap();
        let updated = resolver
            .set_status(&conversation.id, ConversationStatus::Resolved)
            .await
            .unwrap();
        assert_eq!(updated.status, ConversationStatus::Resolved);
        let updated = resolver
            .set_priority(&conversation.id, ConversationPriority::Urgent)
            .await
            .unwrap();
        assert_eq!(updated.priority, ConversationPriority::Urgent);
    }

    #[tokio::test]
    async fn missing_conversation_is_not_found() {
        let (resolver, _h) = resolver().await;
        assert!(resolver.get("nope").await.unwrap_err().is_not_found());
        assert!(resolver.reactivate("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn deleted_conversation_leaves_active_list() {
        let (resolver, _h) = resolver().await;
        let conversation = resolver.resolve(&key("c-1")).await.unwrap();
        let deleted = resolver.soft_delete(&conversation.id).await.unwrap();
        assert!(deleted.is_deleted);
        assert!(resolver.list_active("org-1").await.unwrap().is_empty());
    }
}
