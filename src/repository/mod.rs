//! # User Repository
//!
//! Durable store port for user records and its Postgres adapter.
//!
//! Callers bound every call with their own deadline and report an expired
//! deadline as [`RepositoryError::Timeout`].

mod postgres;

pub use postgres::PgUserRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::UserRecord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// A record's id already exists in the store
    #[error("duplicate user record")]
    Duplicate,

    #[error("user record not found")]
    NotFound,

    #[error("store operation {operation} failed: {message}")]
    Io { operation: String, message: String },

    #[error("store operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl RepositoryError {
    pub fn io(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Durable store of user records.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Atomically insert every record: all of them land or none do.
    async fn bulk_insert(&self, users: &[UserRecord]) -> Result<(), RepositoryError>;

    async fn create(&self, user: &UserRecord) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: i64) -> Result<UserRecord, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<UserRecord>, RepositoryError>;

    /// Page of records ordered by id.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<UserRecord>, RepositoryError>;

    /// Delete by id; [`RepositoryError::NotFound`] when nothing matched.
    async fn delete(&self, id: i64) -> Result<(), RepositoryError>;
}
