//! # Consumer
//!
//! Wires the consuming half of the pipeline:
//!
//! ```text
//!   MessageQueue ──> BatchingEngine ──> dispatch (N) ──> N BatchProcessors ──> store + cache
//!                                                              │
//!                                                              └──> ErrorSink
//! ```
//!
//! Shutdown runs purely on channel closure. The delivery stream ends, the
//! engine flushes its partial batch and drops the dispatch sender, the
//! processors drain the dispatch channel and exit, and then the last error
//! sender goes away and the sink finishes. [`Consumer::run`] returns only
//! after all of that, so every accepted record has been processed or
//! reported by then.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, instrument};

use super::batching::{Batch, BatchingConfig, BatchingEngine, EngineReport};
use super::error_sink::{ErrorSink, ErrorSinkReport};
use super::processor::{BatchProcessor, ProcessorReport};
use crate::cache::UserCache;
use crate::config::ConsumerConfig;
use crate::encryption::Encryptor;
use crate::error::{IngestError, Result};
use crate::messaging::MessageQueue;
use crate::repository::UserRepository;

/// Everything one consumer run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub engine: EngineReport,
    pub processor: ProcessorReport,
    pub errors: ErrorSinkReport,
}

pub struct Consumer {
    queue: Arc<dyn MessageQueue>,
    repository: Arc<dyn UserRepository>,
    cache: Arc<dyn UserCache>,
    encryptor: Arc<dyn Encryptor>,
    config: ConsumerConfig,
}

impl Consumer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        repository: Arc<dyn UserRepository>,
        cache: Arc<dyn UserCache>,
        encryptor: Arc<dyn Encryptor>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            repository,
            cache,
            encryptor,
            config,
        }
    }

    /// Subscribe and process until the subscription ends.
    #[instrument(skip(self), fields(queue = %self.queue.queue_name()))]
    pub async fn run(&self) -> Result<ConsumerReport> {
        let deliveries = self.queue.subscribe().await?;
        let worker_count = self.config.worker_count.max(1);

        let (error_tx, error_rx) = ErrorSink::channel(self.config.error_buffer_size);
        let sink = ErrorSink::spawn(error_rx);

        let (batch_tx, batch_rx) = mpsc::channel::<Batch>(worker_count);
        let processor = Arc::new(BatchProcessor::new(
            Arc::clone(&self.repository),
            Arc::clone(&self.cache),
            Arc::clone(&self.encryptor),
            self.config.persist_timeout(),
            self.config.cache_timeout(),
            error_tx,
        ));
        let workers = Arc::clone(&processor).spawn_pool(worker_count, batch_rx);

        let engine = BatchingEngine::new(
            BatchingConfig {
                batch_size: self.config.batch_size,
                flush_interval: self.config.flush_interval(),
            },
            batch_tx,
        );
        let engine_report = engine.run(deliveries).await;

        let mut join_failure = None;
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "❌ CONSUMER: Batch processor worker crashed");
                join_failure.get_or_insert(IngestError::task_join("batch_processor", e));
            }
        }

        let processor_report = processor.report_snapshot();
        // last error sender lives in the processor
        drop(processor);
        let errors = sink
            .await
            .map_err(|e| IngestError::task_join("error_sink", e))?;

        if let Some(failure) = join_failure {
            return Err(failure);
        }

        info!(
            batches = engine_report.batches_dispatched(),
            persisted = processor_report.records_persisted,
            dropped = processor_report.records_dropped,
            errors = errors.total(),
            "✅ CONSUMER: Subscription drained, all batches processed"
        );

        Ok(ConsumerReport {
            engine: engine_report,
            processor: processor_report,
            errors,
        })
    }

    /// Release the queue connection; a running [`Consumer::run`] then drains
    /// and returns.
    pub async fn close(&self) -> Result<()> {
        self.queue.close().await?;
        info!(queue = %self.queue.queue_name(), "🔌 CONSUMER: Queue connection closed");
        Ok(())
    }
}
