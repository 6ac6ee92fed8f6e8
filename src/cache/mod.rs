//! # User Cache
//!
//! Fast key/value lookup of user records keyed by the stringified record id.
//! Entries expire after the configured TTL. The cache is strictly secondary
//! to the store: population is best effort and a failed cache write never
//! undoes a committed insert.

mod in_memory;
mod redis;

pub use in_memory::InMemoryUserCache;
pub use redis::RedisUserCache;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::UserRecord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache connection error: {message}")]
    Connection { message: String },

    #[error("cache command {command} failed: {message}")]
    Command { command: String, message: String },

    #[error("cache value for key {key} could not be encoded or decoded: {message}")]
    Serialization { key: String, message: String },

    #[error("cache operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl CacheError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn serialization(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serialization {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

#[async_trait]
pub trait UserCache: Send + Sync + 'static {
    /// `Ok(None)` on a miss.
    async fn get(&self, key: &str) -> Result<Option<UserRecord>, CacheError>;

    async fn set(&self, key: &str, user: &UserRecord) -> Result<(), CacheError>;

    /// Store every record under its own key in one round trip.
    async fn set_bulk(&self, users: &[UserRecord]) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
