// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion pipeline for the Parley messaging platform.
//!
//! - [`WebhookIntake`] stores each raw delivery, normalizes it and hands the
//!   canonical messages to a [`MessageSink`], keeping retry bookkeeping.
//! - [`ConversationResolver`] finds or creates the single active
//!   conversation for a sender.
//! - [`MessageLifecycleManager`] stores messages and drives the delivery
//!   status state machine.
//! - [`Pipeline`] wires them together with the event publisher.
//! - [`OutboxWorker`] turns queued AI responses into outbound messages.

pub mod intake;
pub mod lifecycle;
pub mod pipeline;
pub mod publish;
pub mod resolver;
pub mod shutdown;
pub mod worker;

pub use intake::{IntakeSettings, MessageSink, WebhookIntake};
pub use lifecycle::MessageLifecycleManager;
pub use pipeline::Pipeline;
pub use resolver::ConversationResolver;
pub use worker::{DrainReport, OutboxWorker};
