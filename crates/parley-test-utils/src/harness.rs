// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for storage-backed integration tests.
//!
//! `TestHarness` opens a temp SQLite database, registers the mediums a test
//! needs and pairs the store with a [`RecordingPublisher`].

use std::sync::Arc;

use parley_config::model::StorageConfig;
use parley_core::types::Platform;
use parley_core::{ContactDirectory, ParleyError, StorageAdapter};
use parley_storage::{Database, SqliteStorage};

use crate::recording_publisher::RecordingPublisher;

pub const TEST_ORG: &str = "org-test";
pub const TEST_USER: &str = "user-test";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    mediums: Vec<(String, Platform)>,
    on_disk: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            mediums: Vec::new(),
            on_disk: false,
        }
    }

    /// Registers `medium_id` for [`TEST_ORG`]/[`TEST_USER`] on build.
    pub fn with_medium(mut self, medium_id: &str, platform: Platform) -> Self {
        self.mediums.push((medium_id.to_string(), platform));
        self
    }

    /// Uses a WAL-mode database file in a temp directory instead of memory.
    pub fn on_disk(mut self) -> Self {
        self.on_disk = true;
        self
    }

    pub async fn build(self) -> Result<TestHarness, ParleyError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ParleyError::Storage { source: e.into() })?;
        let storage = if self.on_disk {
            let storage = SqliteStorage::new(StorageConfig {
                database_path: temp_dir.path().join("parley.db").to_string_lossy().to_string(),
                wal_mode: true,
            });
            storage.initialize().await?;
            storage
        } else {
            SqliteStorage::from_database(StorageConfig::default(), Database::open_in_memory().await?)
        };
        let storage = Arc::new(storage);

        for (medium_id, platform) in &self.mediums {
            storage
                .register_medium(medium_id, TEST_ORG, TEST_USER, *platform)
                .await?;
        }

        Ok(TestHarness {
            storage,
            publisher: Arc::new(RecordingPublisher::new()),
            _temp_dir: temp_dir,
        })
    }
}

/// Temp storage plus a recording publisher.
pub struct TestHarness {
    pub storage: Arc<SqliteStorage>,
    pub publisher: Arc<RecordingPublisher>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// An in-memory harness with one WhatsApp medium, `wa-test`.
    pub async fn new() -> Result<Self, ParleyError> {
        Self::builder()
            .with_medium("wa-test", Platform::WhatsApp)
            .build()
            .await
    }

    pub fn storage_adapter(&self) -> Arc<dyn StorageAdapter> {
        self.storage.clone()
    }

    pub fn directory(&self) -> Arc<dyn ContactDirectory> {
        self.storage.clone()
    }
}
