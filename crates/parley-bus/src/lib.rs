// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event transport helpers for the Parley pipeline.
//!
//! [`BroadcastPublisher`] fans events out in-process over one tokio broadcast
//! channel per topic. [`Deduplicator`] is the consumer half of at-least-once
//! delivery: it remembers recently seen `event_id`s.

pub mod broadcast;
pub mod dedup;

pub use broadcast::{BroadcastPublisher, Subscription};
pub use dedup::Deduplicator;
