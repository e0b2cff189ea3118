//! Hotelflow Ingest - run the ingestion pipeline against S3

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hotelflow_common::logging::{init_logging, LogConfig, LogLevel};
use hotelflow_ingest::{
    IngestConfig, IngestError, IngestHandler, IngestResponse, S3Storage, StorageBackend,
    StreamBatch,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "hotelflow-ingest")]
#[command(author, version, about = "Hotel telemetry ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one stream batch and merge it into the destination
    Invoke {
        /// Batch JSON file, or `-` for stdin
        #[arg(short, long)]
        event: PathBuf,

        /// Deadline for this invocation, overriding the configured one
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Show whether the destination object exists
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("hotelflow-ingest")
        .build();
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        },
    };

    match execute(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        },
    }
}

async fn execute(command: Command) -> Result<ExitCode> {
    match command {
        Command::Invoke {
            event,
            timeout_secs,
        } => {
            let batch = read_batch(&event)?;
            info!(records = batch.len(), "Loaded stream batch");

            // Configuration problems are invocation failures like any other
            let config = match IngestConfig::load() {
                Ok(config) => config,
                Err(err) => {
                    error!(error = %err, "Invalid configuration");
                    return print_response(&IngestResponse::error(IngestError::from(err)));
                },
            };
            let store = Arc::new(S3Storage::new(config.s3.clone()).await);

            let handler = IngestHandler::from_config(&config, store);
            let response = match timeout_secs {
                Some(secs) => {
                    let deadline = Instant::now() + Duration::from_secs(secs);
                    handler.handle_with_deadline(&batch, Some(deadline)).await
                },
                None => handler.handle(&batch).await,
            };

            print_response(&response)
        },
        Command::Status => {
            let config = IngestConfig::load().context("invalid configuration")?;
            let store = S3Storage::new(config.s3.clone()).await;
            let destination = config.destination.resolve()?;
            match store.head(&destination).await? {
                Some(meta) => {
                    println!("{} exists", destination);
                    println!("  size:    {} bytes", meta.size);
                    println!("  version: {}", meta.version.as_deref().unwrap_or("-"));
                    if let Some(modified) = meta.last_modified {
                        println!("  modified: {}", modified.to_rfc3339());
                    }
                },
                None => println!("{} does not exist yet", destination),
            }
            Ok(ExitCode::SUCCESS)
        },
    }
}

fn print_response(response: &IngestResponse) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_batch(path: &Path) -> Result<StreamBatch> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read batch from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };

    serde_json::from_str(&raw).context("batch is not a valid stream event")
}
