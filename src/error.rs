//! # Crate Errors
//!
//! Top-level error type for the ingestion pipeline. Each concern owns its own
//! `thiserror` enum close to the code that raises it; `IngestError` folds them
//! together for callers that drive whole runs (the binaries and the pipeline
//! entry points).

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigurationError;
use crate::encryption::EncryptionError;
use crate::messaging::MessagingError;
use crate::repository::RepositoryError;
use crate::source::SourceError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Background task '{task}' failed: {message}")]
    TaskJoin { task: String, message: String },
}

impl IngestError {
    pub fn task_join(task: impl Into<String>, error: tokio::task::JoinError) -> Self {
        Self::TaskJoin {
            task: task.into(),
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
