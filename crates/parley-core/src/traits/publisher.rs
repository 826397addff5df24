// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event publisher trait for the topic transport.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::events::{EventEnvelope, Topic};
use crate::traits::adapter::PluginAdapter;

/// Publishes domain events to named topics.
///
/// Delivery is at-least-once: a successful return means the transport
/// accepted the event, not that any consumer saw it exactly once. Ordering is
/// best-effort within a topic and not guaranteed across topics.
#[async_trait]
pub trait EventPublisher: PluginAdapter {
    /// Publishes `event` on `topic`. Failures surface to the caller.
    async fn publish(&self, topic: Topic, event: &EventEnvelope) -> Result<(), ParleyError>;
}
