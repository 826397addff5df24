// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Parley messaging pipeline.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, typed queries for webhook events,
//! contacts, conversations and messages, and a durable outbox queue that
//! doubles as an event transport.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod outbox;
pub mod queries;
pub mod writer;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use models::*;
pub use outbox::{OutboxDelivery, SqliteOutbox};
