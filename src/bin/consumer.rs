//! # User Ingest Consumer
//!
//! Consumes user records from the ingestion queue, batches them, and writes
//! each batch to Postgres and Redis. Ctrl-C closes the queue; in-flight
//! batches drain before the process exits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use user_ingest::cache::RedisUserCache;
use user_ingest::config::ConfigManager;
use user_ingest::database::DatabaseConnection;
use user_ingest::encryption::AesGcmEncryptor;
use user_ingest::ingestion::Consumer;
use user_ingest::logging::init_structured_logging;
use user_ingest::messaging::{MessageQueue, RabbitMqQueue};
use user_ingest::repository::PgUserRepository;

#[derive(Parser)]
#[command(name = "user-ingest-consumer")]
#[command(about = "Batch user records from the ingestion queue into Postgres and Redis")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
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

    let encryptor = AesGcmEncryptor::new(config.encryption.key.as_bytes())
        .context("encryption.key must be 16, 24 or 32 bytes")?;

    let database = DatabaseConnection::connect(&config.database)
        .await
        .context("failed to connect to Postgres")?;
    database
        .ensure_schema()
        .await
        .context("failed to prepare the user_details table")?;
    let cache = RedisUserCache::connect(&config.redis)
        .await
        .context("failed to connect to Redis")?;
    let queue: Arc<dyn MessageQueue> = Arc::new(
        RabbitMqQueue::connect(&config.rabbitmq)
            .await
            .context("failed to connect to the message broker")?,
    );

    info!(
        queue = %config.rabbitmq.queue_name,
        batch_size = config.consumer.batch_size,
        flush_interval_ms = config.consumer.flush_interval_ms,
        workers = config.consumer.worker_count,
        key_bits = encryptor.key_bits(),
        "🚀 CONSUMER: Starting"
    );

    let shutdown_queue = Arc::clone(&queue);
    let shutdown = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 CONSUMER: Interrupt received, closing queue and draining batches");
            if let Err(e) = shutdown_queue.close().await {
                error!(error = %e, "❌ CONSUMER: Failed to close queue on interrupt");
            }
        }
    });

    let consumer = Consumer::new(
        queue,
        Arc::new(PgUserRepository::new(database.pool().clone())),
        Arc::new(cache),
        Arc::new(encryptor),
        config.consumer.clone(),
    );
    let outcome = consumer.run().await;

    shutdown.abort();
    if let Err(e) = consumer.close().await {
        warn!(error = %e, "Queue connection was already closed");
    }
    database.close().await;

    let report = outcome?;
    info!(
        batches = report.engine.batches_dispatched(),
        persisted = report.processor.records_persisted,
        dropped = report.processor.records_dropped,
        persist_failures = report.processor.persist_failures,
        cache_failures = report.processor.cache_failures,
        rejected_deliveries = report.engine.deliveries_rejected,
        "🏁 CONSUMER: Finished"
    );
    Ok(())
}
