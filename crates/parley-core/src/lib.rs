// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley messaging pipeline.
//!
//! This crate provides the trait definitions, error type, domain types and
//! event envelopes used throughout the Parley workspace. Storage backends and
//! event transports implement the traits defined here.

pub mod error;
pub mod events;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ParleyError;
pub use events::{EventEnvelope, EventPayload, Topic};
pub use types::{
    AdapterType, CanonicalMessage, Conversation, ConversationKey, Direction, HealthStatus,
    Message, MessageStatus, MessageType, Platform, SenderType, WebhookEvent, WebhookStatus,
};

// Re-export all adapter traits at crate root.
pub use traits::{ContactDirectory, EventPublisher, PluginAdapter, StorageAdapter};
