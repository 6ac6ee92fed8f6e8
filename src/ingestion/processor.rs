//! # Batch Processor Pool
//!
//! Fixed pool of workers pulling batches from the dispatch channel. Each
//! batch goes through three steps:
//!
//! 1. **Encrypt** every email. A record whose encryption fails is dropped
//!    from the batch and reported; the rest carry on.
//! 2. **Persist** the survivors with one bulk insert under a deadline. A
//!    failure (duplicate, I/O or timeout) is reported and the batch ends
//!    here, so nothing uncommitted is ever cached.
//! 3. **Cache** the committed records. Failure is reported but does not undo
//!    the insert.
//!
//! Workers never retry; they report to the error sink and take the next
//! batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::batching::Batch;
use super::error_sink::PipelineError;
use crate::cache::{CacheError, UserCache};
use crate::encryption::Encryptor;
use crate::logging::log_batch_operation;
use crate::models::UserRecord;
use crate::repository::{RepositoryError, UserRepository};

/// Result of processing one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Store committed. `cached` is false when cache population failed.
    Persisted {
        persisted: usize,
        dropped: usize,
        cached: bool,
    },
    /// Every record failed encryption; nothing was written
    Empty { dropped: usize },
    /// Store write failed or timed out; nothing was written or cached
    PersistFailed { dropped: usize },
}

/// Totals across every worker in the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorReport {
    pub batches_processed: u64,
    pub records_persisted: u64,
    pub records_dropped: u64,
    pub persist_failures: u64,
    pub duplicate_batches: u64,
    pub cache_failures: u64,
}

#[derive(Debug, Default)]
struct ProcessorCounters {
    batches_processed: AtomicU64,
    records_persisted: AtomicU64,
    records_dropped: AtomicU64,
    persist_failures: AtomicU64,
    duplicate_batches: AtomicU64,
    cache_failures: AtomicU64,
}

pub struct BatchProcessor {
    repository: Arc<dyn UserRepository>,
    cache: Arc<dyn UserCache>,
    encryptor: Arc<dyn Encryptor>,
    persist_timeout: Duration,
    cache_timeout: Duration,
    errors: mpsc::Sender<PipelineError>,
    counters: ProcessorCounters,
}

impl BatchProcessor {
    pub fn new(
        repository: Arc<dyn UserRepository>,
        cache: Arc<dyn UserCache>,
        encryptor: Arc<dyn Encryptor>,
        persist_timeout: Duration,
        cache_timeout: Duration,
        errors: mpsc::Sender<PipelineError>,
    ) -> Self {
        Self {
            repository,
            cache,
            encryptor,
            persist_timeout,
            cache_timeout,
            errors,
            counters: ProcessorCounters::default(),
        }
    }

    /// Start `worker_count` workers sharing `batches`. They exit once the
    /// channel is closed and drained.
    pub fn spawn_pool(
        self: Arc<Self>,
        worker_count: usize,
        batches: mpsc::Receiver<Batch>,
    ) -> Vec<JoinHandle<()>> {
        let batches = Arc::new(Mutex::new(batches));
        info!("🏊 POOL: Starting {} batch processor workers", worker_count);

        (0..worker_count.max(1))
            .map(|worker_id| {
                let processor = Arc::clone(&self);
                let batches = Arc::clone(&batches);
                tokio::spawn(async move {
                    processor.run_worker(worker_id, batches).await;
                })
            })
            .collect()
    }

    async fn run_worker(&self, worker_id: usize, batches: Arc<Mutex<mpsc::Receiver<Batch>>>) {
        debug!(worker_id = worker_id, "Batch processor worker started");
        loop {
            let next = { batches.lock().await.recv().await };
            let Some(batch) = next else {
                break;
            };
            self.process(batch).await;
        }
        debug!(worker_id = worker_id, "Batch processor worker finished");
    }

    #[instrument(
        skip(self, batch),
        fields(batch_sequence = batch.sequence, record_count = batch.len())
    )]
    pub async fn process(&self, batch: Batch) -> BatchOutcome {
        let sequence = batch.sequence;
        self.counters.batches_processed.fetch_add(1, Ordering::Relaxed);

        let sealed = self.encrypt_batch(sequence, batch.records).await;
        let dropped = sealed.dropped;
        let records = sealed.records;
        self.counters
            .records_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);

        if records.is_empty() {
            warn!(batch_sequence = sequence, dropped = dropped, "Nothing left to persist in batch");
            return BatchOutcome::Empty { dropped };
        }

        if let Err(source) = self.persist(&records).await {
            self.counters.persist_failures.fetch_add(1, Ordering::Relaxed);
            if source.is_duplicate() {
                self.counters.duplicate_batches.fetch_add(1, Ordering::Relaxed);
            }
            self.report(PipelineError::Persistence {
                batch_sequence: sequence,
                record_count: records.len(),
                source,
            })
            .await;
            return BatchOutcome::PersistFailed { dropped };
        }
        self.counters
            .records_persisted
            .fetch_add(records.len() as u64, Ordering::Relaxed);

        let cached = match self.populate_cache(&records).await {
            Ok(()) => true,
            Err(source) => {
                self.counters.cache_failures.fetch_add(1, Ordering::Relaxed);
                self.report(PipelineError::Cache {
                    batch_sequence: sequence,
                    record_count: records.len(),
                    source,
                })
                .await;
                false
            }
        };

        log_batch_operation(
            "process_batch",
            sequence,
            records.len(),
            "persisted",
            (!cached).then_some("cache population failed"),
        );

        BatchOutcome::Persisted {
            persisted: records.len(),
            dropped,
            cached,
        }
    }

    async fn encrypt_batch(&self, sequence: u64, records: Vec<UserRecord>) -> SealedBatch {
        let mut sealed = SealedBatch {
            records: Vec::with_capacity(records.len()),
            dropped: 0,
        };

        for mut user in records {
            match self.encryptor.encrypt(&user.email_address) {
                Ok(token) => {
                    user.email_address = token;
                    sealed.records.push(user);
                }
                Err(source) => {
                    sealed.dropped += 1;
                    self.report(PipelineError::Encryption {
                        batch_sequence: sequence,
                        record_id: user.id,
                        source,
                    })
                    .await;
                }
            }
        }
        sealed
    }

    async fn persist(&self, records: &[UserRecord]) -> Result<(), RepositoryError> {
        let insert = self.repository.bulk_insert(records);
        match tokio::time::timeout(self.persist_timeout, insert).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::timeout(
                "bulk_insert",
                self.persist_timeout.as_millis() as u64,
            )),
        }
    }

    async fn populate_cache(&self, records: &[UserRecord]) -> Result<(), CacheError> {
        match tokio::time::timeout(self.cache_timeout, self.cache.set_bulk(records)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::timeout(
                "set_bulk",
                self.cache_timeout.as_millis() as u64,
            )),
        }
    }

    async fn report(&self, error: PipelineError) {
        if let Err(mpsc::error::SendError(error)) = self.errors.send(error).await {
            warn!(error = %error, "Error sink is gone, error only logged here");
        }
    }

    pub fn report_snapshot(&self) -> ProcessorReport {
        let c = &self.counters;
        ProcessorReport {
            batches_processed: c.batches_processed.load(Ordering::Relaxed),
            records_persisted: c.records_persisted.load(Ordering::Relaxed),
            records_dropped: c.records_dropped.load(Ordering::Relaxed),
            persist_failures: c.persist_failures.load(Ordering::Relaxed),
            duplicate_batches: c.duplicate_batches.load(Ordering::Relaxed),
            cache_failures: c.cache_failures.load(Ordering::Relaxed),
        }
    }
}

struct SealedBatch {
    records: Vec<UserRecord>,
    dropped: usize,
}
