// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides an in-memory event publisher, canned webhook payloads and a
//! storage harness for fast, deterministic tests without external services.
//!
//! # Components
//!
//! - [`RecordingPublisher`] - Captures published events, can be told to fail or stall
//! - [`fixtures`] - Webhook payloads in each platform's shape
//! - [`TestHarness`] - Temp SQLite storage with registered mediums

pub mod fixtures;
pub mod harness;
pub mod recording_publisher;

pub use harness::{TestHarness, TEST_ORG, TEST_USER};
pub use recording_publisher::RecordingPublisher;
