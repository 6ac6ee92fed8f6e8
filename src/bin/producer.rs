//! # User Ingest Producer
//!
//! Reads a CSV export of user records and publishes every well-formed row to
//! the ingestion queue.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use user_ingest::config::ConfigManager;
use user_ingest::ingestion::Producer;
use user_ingest::logging::init_structured_logging;
use user_ingest::messaging::RabbitMqQueue;
use user_ingest::source::CsvSource;

#[derive(Parser)]
#[command(name = "user-ingest-producer")]
#[command(about = "Publish user records from a CSV export to the ingestion queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// CSV file to read (overrides producer.source_path)
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Environment overlay to load (default: USER_INGEST_ENV, then APP_ENV)
    #[arg(short, long)]
    environment: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.environment {
        Some(environment) => {
            ConfigManager::load_from_directory_with_env(cli.config_dir, environment)
        }
        None => ConfigManager::load_from_directory(cli.config_dir),
    }
    .context("failed to load configuration")?;
    let config = manager.config();
    init_structured_logging(&config.logging);
    manager.log_loaded();

    let source_path = cli
        .source
        .unwrap_or_else(|| config.producer.source_path.clone());
    let source = CsvSource::open(&source_path)
        .with_context(|| format!("failed to open source {}", source_path.display()))?;

    let queue = RabbitMqQueue::connect(&config.rabbitmq)
        .await
        .context("failed to connect to the message broker")?;

    info!(
        source = %source_path.display(),
        queue = %config.rabbitmq.queue_name,
        workers = config.producer.worker_count,
        "🚀 PRODUCER: Starting"
    );

    let producer = Producer::new(Arc::new(queue), config.producer.clone());
    let outcome = producer.start(source).await;

    if let Err(e) = producer.close().await {
        error!(error = %e, "❌ PRODUCER: Failed to close queue connection");
    }

    let report = outcome?;
    info!(
        published = report.published,
        publish_failures = report.publish_failures,
        rows_skipped = report.rows_skipped,
        "🏁 PRODUCER: Finished"
    );
    Ok(())
}
