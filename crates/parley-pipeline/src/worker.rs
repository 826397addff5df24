// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbox consumer for `ai-response-received`.
//!
//! Leases entries from the SQLite outbox, turns each AI response into an
//! outbound message through [`Pipeline::handle_ai_response`], and acks it.
//! An event id already handled inside the dedup window is acked without
//! reprocessing.

use std::sync::Arc;
use std::time::Duration;

use parley_bus::Deduplicator;
use parley_core::{ParleyError, Topic};
use parley_storage::{OutboxDelivery, SqliteOutbox};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::pipeline::Pipeline;

/// What one drained entry came to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub handled: usize,
    pub duplicates: usize,
    pub retried: usize,
    pub dropped: usize,
}

pub struct OutboxWorker {
    outbox: Arc<SqliteOutbox>,
    pipeline: Arc<Pipeline>,
    dedup: Deduplicator,
    poll_interval: Duration,
}

impl OutboxWorker {
    pub fn new(
        outbox: Arc<SqliteOutbox>,
        pipeline: Arc<Pipeline>,
        dedup_window: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            outbox,
            pipeline,
            dedup: Deduplicator::new(dedup_window),
            poll_interval,
        }
    }

    /// Drains the topic, then polls every `poll_interval` until `cancel`
    /// fires. An entry being handled when cancellation arrives is finished
    /// first.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ParleyError> {
        info!(topic = %Topic::AiResponseReceived, "outbox worker running");
        loop {
            match self.drain().await {
                Ok(report) if report != DrainReport::default() => {
                    debug!(?report, "outbox drained");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "outbox drain failed"),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!("outbox worker stopped");
        Ok(())
    }

    /// Handles every entry currently available.
    pub async fn drain(&mut self) -> Result<DrainReport, ParleyError> {
        let mut report = DrainReport::default();
        while let Some(delivery) = self.outbox.next(Topic::AiResponseReceived).await? {
            self.handle(&delivery, &mut report).await?;
        }
        Ok(report)
    }

    async fn handle(
        &mut self,
        delivery: &OutboxDelivery,
        report: &mut DrainReport,
    ) -> Result<(), ParleyError> {
        let event_id = delivery.envelope.event_id.as_str();
        if self.dedup.contains(event_id) {
            debug!(event_id, entry_id = delivery.entry_id, "duplicate AI response acked");
            self.outbox.ack(delivery).await?;
            report.duplicates += 1;
            return Ok(());
        }

        match self.pipeline.handle_ai_response(&delivery.envelope).await {
            Ok(message) => {
                self.outbox.ack(delivery).await?;
                self.dedup.first_seen(event_id);
                debug!(event_id, message_id = %message.id, "AI response handled");
                report.handled += 1;
            }
            Err(e) if e.is_retryable() => {
                let exhausted = self.outbox.fail(delivery).await?;
                if exhausted {
                    error!(event_id, attempts = delivery.attempts, error = %e, "AI response dropped after exhausting attempts");
                    report.dropped += 1;
                } else {
                    warn!(event_id, attempts = delivery.attempts, error = %e, "AI response will be retried");
                    report.retried += 1;
                }
            }
            Err(e) => {
                warn!(event_id, error = %e, "AI response rejected");
                self.outbox.bury(delivery).await?;
                report.dropped += 1;
            }
        }
        Ok(())
    }
}
