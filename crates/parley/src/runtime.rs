// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembles the pipeline from configuration: storage, the configured event
//! publisher, the normalizer registry, intake and the outbox worker.

use std::sync::Arc;
use std::time::Duration;

use parley_bus::BroadcastPublisher;
use parley_config::model::{ParleyConfig, PublisherBackend};
use parley_core::{EventPublisher, ParleyError, PluginAdapter, StorageAdapter};
use parley_normalize::NormalizerRegistry;
use parley_pipeline::{IntakeSettings, OutboxWorker, Pipeline, WebhookIntake};
use parley_storage::{SqliteOutbox, SqliteStorage};
use tracing::{debug, info};

pub struct Runtime {
    pub storage: Arc<SqliteStorage>,
    pub publisher: Arc<dyn EventPublisher>,
    pub pipeline: Arc<Pipeline>,
    pub intake: WebhookIntake,
    outbox: Option<Arc<SqliteOutbox>>,
    dedup_window: usize,
}

impl Runtime {
    /// Opens the database and wires every stage.
    pub async fn open(config: &ParleyConfig) -> Result<Self, ParleyError> {
        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;
        Self::with_storage(config, storage)
    }

    pub fn with_storage(
        config: &ParleyConfig,
        storage: Arc<SqliteStorage>,
    ) -> Result<Self, ParleyError> {
        let registry = NormalizerRegistry::from_enabled(&config.platforms.enabled)?;
        let (publisher, outbox): (Arc<dyn EventPublisher>, Option<Arc<SqliteOutbox>>) =
            match config.publisher.backend {
                PublisherBackend::Outbox => {
                    let outbox = Arc::new(SqliteOutbox::new(storage.clone()));
                    (outbox.clone(), Some(outbox))
                }
                PublisherBackend::Broadcast => (
                    Arc::new(BroadcastPublisher::new(config.publisher.broadcast_capacity)),
                    None,
                ),
            };
        info!(
            backend = publisher.name(),
            platforms = ?registry.platforms(),
            "pipeline assembled"
        );

        let settings = IntakeSettings::from_config(&config.intake, &config.publisher);
        let pipeline = Arc::new(Pipeline::new(
            storage.clone(),
            storage.clone(),
            publisher.clone(),
            settings.publish_timeout,
        ));
        let intake = WebhookIntake::new(
            storage.clone(),
            registry,
            pipeline.clone(),
            publisher.clone(),
            settings,
        );

        Ok(Self {
            storage,
            publisher,
            pipeline,
            intake,
            outbox,
            dedup_window: config.publisher.dedup_window,
        })
    }

    /// A worker draining `ai-response-received` from the outbox. Only the
    /// outbox backend persists events for a separate worker process.
    pub fn outbox_worker(&self, poll_interval: Duration) -> Result<OutboxWorker, ParleyError> {
        let outbox = self.outbox.clone().ok_or_else(|| {
            ParleyError::Config(
                "`work` needs publisher.backend = \"outbox\"; broadcast events are not persisted"
                    .to_string(),
            )
        })?;
        Ok(OutboxWorker::new(
            outbox,
            self.pipeline.clone(),
            self.dedup_window,
            poll_interval,
        ))
    }

    /// Shuts the publisher down and checkpoints the database.
    pub async fn close(&self) -> Result<(), ParleyError> {
        self.publisher.shutdown().await?;
        self.storage.close().await?;
        debug!("runtime closed");
        Ok(())
    }
}
