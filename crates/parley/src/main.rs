// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - multi-platform webhook ingestion and conversation pipeline.
//!
//! This is the binary entry point: operator commands over the SQLite store
//! plus the long-running outbox worker.

mod runtime;
mod status;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use parley_config::ParleyConfig;
use parley_core::types::{Platform, WebhookEvent};
use parley_core::{ContactDirectory, ParleyError};
use parley_pipeline::shutdown;
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::runtime::Runtime;

/// Parley - multi-platform webhook ingestion and conversation pipeline.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Explicit config file instead of the XDG lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Store and process one webhook payload (read from a file or stdin).
    Ingest {
        /// Platform tag: whatsapp, instagram, facebook or email.
        #[arg(long)]
        platform: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        medium: String,
        /// JSON payload file; stdin when omitted.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Reprocess pending webhook events, or one event by id.
    Retry {
        #[arg(long)]
        event: Option<String>,
    },
    /// Republish `webhook-received` for a stored event.
    Announce {
        #[arg(long)]
        event: String,
    },
    /// Show webhook and outbox counts.
    Status {
        #[arg(long)]
        json: bool,
        #[arg(long)]
        plain: bool,
    },
    /// Bind a medium (connected channel account) to its owning user.
    RegisterMedium {
        #[arg(long)]
        medium: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        platform: String,
    },
    /// Consume AI responses from the outbox until interrupted.
    Work {
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
        /// How long a stopping worker may take to finish its current entry.
        #[arg(long, default_value_t = 10)]
        drain_timeout_secs: u64,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup
    let loaded = match &cli.config {
        Some(path) => parley_config::load_and_validate_path(path),
        None => parley_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Some(command) => run(command, &config).await,
        None => {
            println!("parley: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("parley: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &ParleyConfig) -> Result<(), ParleyError> {
    if let Commands::Config = command {
        let rendered = toml::to_string_pretty(config)
            .map_err(|e| ParleyError::Internal(format!("failed to render config: {e}")))?;
        print!("{rendered}");
        return Ok(());
    }

    let runtime = Runtime::open(config).await?;
    let result = dispatch(command, &runtime, config).await;
    runtime.close().await?;
    result
}

async fn dispatch(
    command: Commands,
    runtime: &Runtime,
    config: &ParleyConfig,
) -> Result<(), ParleyError> {
    match command {
        Commands::Ingest {
            platform,
            org,
            medium,
            file,
        } => {
            let payload = read_payload(file.as_deref()).await?;
            let event = runtime.intake.receive(&platform, &org, &medium, &payload).await?;
            print_event(&event);
            Ok(())
        }
        Commands::Retry { event: Some(id) } => {
            let event = runtime.intake.reprocess(&id).await?;
            print_event(&event);
            Ok(())
        }
        Commands::Retry { event: None } => {
            let events = runtime.intake.retry_pending().await?;
            for event in &events {
                print_event(event);
            }
            println!("{} event(s) retried", events.len());
            Ok(())
        }
        Commands::Announce { event } => {
            runtime.intake.announce(&event).await?;
            println!("{event} announced");
            Ok(())
        }
        Commands::Status { json, plain } => {
            status::run_status(&runtime.storage, &config.storage.database_path, json, plain).await
        }
        Commands::RegisterMedium {
            medium,
            org,
            user,
            platform,
        } => {
            let platform = Platform::from_str(platform.trim())
                .map_err(|_| ParleyError::UnknownPlatform(platform.clone()))?;
            runtime
                .storage
                .register_medium(&medium, &org, &user, platform)
                .await?;
            println!("medium {medium} registered to {org}/{user} ({platform})");
            Ok(())
        }
        Commands::Work {
            poll_ms,
            drain_timeout_secs,
        } => run_worker(runtime, poll_ms, drain_timeout_secs).await,
        Commands::Config => Ok(()),
    }
}

async fn run_worker(
    runtime: &Runtime,
    poll_ms: u64,
    drain_timeout_secs: u64,
) -> Result<(), ParleyError> {
    let worker = runtime.outbox_worker(Duration::from_millis(poll_ms))?;
    let cancel = shutdown::install_signal_handler();
    let handle = tokio::spawn(worker.run(cancel.clone()));
    info!("parley worker started, press Ctrl+C to stop");

    cancel.cancelled().await;
    shutdown::drain_workers(vec![handle], Duration::from_secs(drain_timeout_secs)).await;
    Ok(())
}

async fn read_payload(file: Option<&std::path::Path>) -> Result<serde_json::Value, ParleyError> {
    let raw = match file {
        Some(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            ParleyError::Validation(format!("cannot read {}: {e}", path.display()))
        })?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .map_err(|e| ParleyError::Validation(format!("cannot read stdin: {e}")))?;
            raw
        }
    };
    serde_json::from_str(&raw)
        .map_err(|e| ParleyError::Validation(format!("payload is not valid JSON: {e}")))
}

fn print_event(event: &WebhookEvent) {
    match &event.error_message {
        Some(error) => println!(
            "{} {} (retries: {}) {error}",
            event.id, event.status, event.retry_count
        ),
        None => println!("{} {}", event.id, event.status),
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
