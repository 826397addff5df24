// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley status` command implementation.
//!
//! Reads webhook event and outbox counts straight from the database, so it
//! works whether or not a worker is running.

use std::collections::BTreeMap;
use std::io::IsTerminal;

use parley_core::types::WebhookStatus;
use parley_core::ParleyError;
use parley_storage::SqliteStorage;
use serde::Serialize;

/// Structured status output for `--json` mode.
#[derive(Debug, Default, Serialize)]
pub struct StatusReport {
    pub database_path: String,
    pub webhooks: BTreeMap<String, i64>,
    /// queue name -> entry status -> count
    pub outbox: BTreeMap<String, BTreeMap<String, i64>>,
}

impl StatusReport {
    pub async fn collect(storage: &SqliteStorage, database_path: &str) -> Result<Self, ParleyError> {
        let mut report = StatusReport {
            database_path: database_path.to_string(),
            ..Self::default()
        };
        for status in [WebhookStatus::Pending, WebhookStatus::Processed, WebhookStatus::Failed] {
            report.webhooks.insert(status.to_string(), 0);
        }
        for (status, count) in storage.webhook_counts().await? {
            report.webhooks.insert(status.to_string(), count);
        }
        for (queue, status, count) in storage.queue_stats().await? {
            report.outbox.entry(queue).or_default().insert(status, count);
        }
        Ok(report)
    }

    fn webhook_count(&self, status: WebhookStatus) -> i64 {
        self.webhooks.get(&status.to_string()).copied().unwrap_or(0)
    }
}

/// Run the `parley status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_status(
    storage: &SqliteStorage,
    database_path: &str,
    json: bool,
    plain: bool,
) -> Result<(), ParleyError> {
    let report = StatusReport::collect(storage, database_path).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_report(&report, use_color);
    }
    Ok(())
}

fn print_report(report: &StatusReport, use_color: bool) {
    println!();
    println!("  parley status");
    println!("  {}", "-".repeat(35));
    println!("    Database: {}", report.database_path);
    println!();

    let pending = report.webhook_count(WebhookStatus::Pending);
    let processed = report.webhook_count(WebhookStatus::Processed);
    let failed = report.webhook_count(WebhookStatus::Failed);
    if use_color {
        use colored::Colorize;
        println!("    Webhooks: {} processed", processed.to_string().green());
        println!("              {} pending", pending.to_string().yellow());
        println!("              {} failed", failed.to_string().red());
    } else {
        println!("    Webhooks: {processed} processed");
        println!("              {pending} pending");
        println!("              {failed} failed");
    }

    if report.outbox.is_empty() {
        println!("    Outbox:   empty");
    } else {
        println!("    Outbox:");
        for (queue, counts) in &report.outbox {
            let summary = counts
                .iter()
                .map(|(status, n)| format!("{n} {status}"))
                .collect::<Vec<_>>()
                .join(", ");
            println!("      {queue:<22} {summary}");
        }
    }
    println!();
}
