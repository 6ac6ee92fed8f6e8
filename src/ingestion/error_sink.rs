//! # Error Sink
//!
//! Single drain for the shared error channel. Batch processors report every
//! failure here and move on; the sink logs each one with its stage and batch
//! context and keeps per-stage counts. It stops once every sender is dropped
//! and the channel is empty.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheError;
use crate::encryption::EncryptionError;
use crate::logging::log_error;
use crate::repository::RepositoryError;

/// Pipeline stage that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Encryption,
    Persistence,
    Cache,
}

impl ErrorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Encryption => "encryption",
            ErrorStage::Persistence => "persistence",
            ErrorStage::Cache => "cache",
        }
    }
}

/// A failure reported by a batch processor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("encrypting record {record_id} in batch {batch_sequence} failed: {source}")]
    Encryption {
        batch_sequence: u64,
        record_id: i64,
        source: EncryptionError,
    },

    #[error("persisting batch {batch_sequence} ({record_count} records) failed: {source}")]
    Persistence {
        batch_sequence: u64,
        record_count: usize,
        source: RepositoryError,
    },

    #[error("caching batch {batch_sequence} ({record_count} records) failed: {source}")]
    Cache {
        batch_sequence: u64,
        record_count: usize,
        source: CacheError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> ErrorStage {
        match self {
            PipelineError::Encryption { .. } => ErrorStage::Encryption,
            PipelineError::Persistence { .. } => ErrorStage::Persistence,
            PipelineError::Cache { .. } => ErrorStage::Cache,
        }
    }

    pub fn batch_sequence(&self) -> u64 {
        match self {
            PipelineError::Encryption { batch_sequence, .. }
            | PipelineError::Persistence { batch_sequence, .. }
            | PipelineError::Cache { batch_sequence, .. } => *batch_sequence,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            PipelineError::Persistence {
                source: RepositoryError::Duplicate,
                ..
            }
        )
    }
}

/// Per-stage counts of drained errors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorSinkReport {
    pub encryption: u64,
    pub persistence: u64,
    /// Subset of `persistence` caused by duplicate ids
    pub duplicates: u64,
    pub cache: u64,
}

impl ErrorSinkReport {
    pub fn total(&self) -> u64 {
        self.encryption + self.persistence + self.cache
    }

    fn record(&mut self, error: &PipelineError) {
        match error.stage() {
            ErrorStage::Encryption => self.encryption += 1,
            ErrorStage::Persistence => {
                self.persistence += 1;
                if error.is_duplicate() {
                    self.duplicates += 1;
                }
            }
            ErrorStage::Cache => self.cache += 1,
        }
    }
}

pub struct ErrorSink;

impl ErrorSink {
    /// Bounded channel the processors report into.
    pub fn channel(
        capacity: usize,
    ) -> (mpsc::Sender<PipelineError>, mpsc::Receiver<PipelineError>) {
        mpsc::channel(capacity.max(1))
    }

    /// Drain `errors` on a background task until every sender is gone.
    pub fn spawn(errors: mpsc::Receiver<PipelineError>) -> JoinHandle<ErrorSinkReport> {
        tokio::spawn(Self::drain(errors))
    }

    pub async fn drain(mut errors: mpsc::Receiver<PipelineError>) -> ErrorSinkReport {
        let mut report = ErrorSinkReport::default();
        debug!("Error sink started");

        while let Some(error) = errors.recv().await {
            report.record(&error);
            let context = format!("batch_sequence={}", error.batch_sequence());
            log_error(error.stage().as_str(), "process_batch", &error.to_string(), Some(&context));
        }

        info!(
            encryption = report.encryption,
            persistence = report.persistence,
            duplicates = report.duplicates,
            cache = report.cache,
            "🧾 ERROR SINK: Error channel closed"
        );
        report
    }
}
