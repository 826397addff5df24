// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley messaging pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Webhook intake retry and timeout settings.
    #[serde(default)]
    pub intake: IntakeConfig,

    /// Event publisher settings.
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Which platform normalizers are registered.
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Instance name, used in log output.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "parley".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("parley").join("parley.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Webhook intake configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IntakeConfig {
    /// Failed processing attempts before an event is marked `failed`.
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,

    /// Upper bound for normalizing and forwarding one webhook, in milliseconds.
    #[serde(default = "default_process_timeout_ms")]
    pub process_timeout_ms: u64,

    /// How many pending events one retry sweep picks up.
    #[serde(default = "default_retry_batch_size")]
    pub retry_batch_size: i64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            process_timeout_ms: default_process_timeout_ms(),
            retry_batch_size: default_retry_batch_size(),
        }
    }
}

fn default_max_retries() -> i64 {
    3
}

fn default_process_timeout_ms() -> u64 {
    10_000
}

fn default_retry_batch_size() -> i64 {
    50
}

/// Event transport selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherBackend {
    /// Durable SQLite outbox drained by workers.
    #[default]
    Outbox,
    /// In-process tokio broadcast channels.
    Broadcast,
}

/// Event publisher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PublisherConfig {
    #[serde(default)]
    pub backend: PublisherBackend,

    /// Upper bound for one publish call, in milliseconds.
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,

    /// Per-topic buffer of the broadcast backend.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// How many recent event ids a consumer remembers for deduplication.
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            backend: PublisherBackend::default(),
            publish_timeout_ms: default_publish_timeout_ms(),
            broadcast_capacity: default_broadcast_capacity(),
            dedup_window: default_dedup_window(),
        }
    }
}

fn default_publish_timeout_ms() -> u64 {
    5_000
}

fn default_broadcast_capacity() -> usize {
    1024
}

fn default_dedup_window() -> usize {
    10_000
}

/// Platform registration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformsConfig {
    /// Platform tags with a registered normalizer.
    #[serde(default = "default_enabled_platforms")]
    pub enabled: Vec<String>,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_platforms(),
        }
    }
}

fn default_enabled_platforms() -> Vec<String> {
    parley_core::Platform::ALL
        .iter()
        .map(|p| p.to_string())
        .collect()
}
