//! # User Service
//!
//! Cache-aside read and write path over the same store and cache the
//! consumer populates. Emails are stored encrypted; every record this
//! service returns has its email decrypted, and every record it writes is
//! encrypted first.
//!
//! Store calls are bounded by the service timeout. Cache calls are best
//! effort: a failed cache read falls through to the store, and a failed
//! cache write or delete is logged and left to the TTL.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheError, UserCache};
use crate::encryption::{EncryptionError, Encryptor};
use crate::models::UserRecord;
use crate::repository::{RepositoryError, UserRepository};

/// Outcome classes a transport layer maps onto its own status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Timeout,
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("user not found")]
    NotFound,

    #[error("user already exists")]
    Conflict,

    #[error("operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("email encryption failed: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("store failure: {0}")]
    Store(RepositoryError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound => ErrorKind::NotFound,
            ServiceError::Conflict => ErrorKind::Conflict,
            ServiceError::Timeout { .. } => ErrorKind::Timeout,
            ServiceError::Encryption(_) | ServiceError::Store(_) => ErrorKind::Internal,
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => ServiceError::NotFound,
            RepositoryError::Duplicate => ServiceError::Conflict,
            RepositoryError::Timeout {
                operation,
                timeout_ms,
            } => ServiceError::Timeout {
                operation,
                timeout_ms,
            },
            other => ServiceError::Store(other),
        }
    }
}

/// Optional case-insensitive substring filters for [`UserService::list_users`]
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Matches first or last name
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserFilter {
    fn matches(&self, user: &UserRecord) -> bool {
        let contains = |haystack: &str, needle: &str| {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        };

        let name_ok = self.name.as_deref().map_or(true, |name| {
            contains(&user.first_name, name) || contains(&user.last_name, name)
        });
        let email_ok = self
            .email
            .as_deref()
            .map_or(true, |email| contains(&user.email_address, email));

        name_ok && email_ok
    }
}

/// One page of users ordered by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPage {
    pub users: Vec<UserRecord>,
    pub offset: i64,
    /// No records exist past this page
    pub is_last: bool,
}

pub struct UserService {
    repository: Arc<dyn UserRepository>,
    cache: Arc<dyn UserCache>,
    encryptor: Arc<dyn Encryptor>,
    timeout: Duration,
}

impl UserService {
    pub fn new(
        repository: Arc<dyn UserRepository>,
        cache: Arc<dyn UserCache>,
        encryptor: Arc<dyn Encryptor>,
        timeout: Duration,
    ) -> Self {
        Self {
            repository,
            cache,
            encryptor,
            timeout,
        }
    }

    pub async fn get_user(&self, id: i64) -> Result<UserRecord, ServiceError> {
        let key = UserRecord::cache_key_for(id);

        let cached = match self.bounded_cache("get", self.cache.get(&key)).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(user_id = id, error = %e, "Cache read failed, falling back to store");
                None
            }
        };

        let user = match cached {
            Some(user) => user,
            None => {
                let user = self
                    .bounded_store("find_by_id", self.repository.find_by_id(id))
                    .await?;
                debug!(user_id = id, "User fetched from store");
                if let Err(e) = self.bounded_cache("set", self.cache.set(&key, &user)).await {
                    warn!(user_id = id, error = %e, "Failed to repopulate cache");
                }
                user
            }
        };

        self.reveal(user)
    }

    /// Encrypt, insert, then cache. Returns the record as given.
    pub async fn create_user(&self, user: UserRecord) -> Result<UserRecord, ServiceError> {
        let sealed = user.with_email(self.encryptor.encrypt(&user.email_address)?);

        self.bounded_store("create", self.repository.create(&sealed))
            .await?;

        if let Err(e) = self
            .bounded_cache("set", self.cache.set(&sealed.cache_key(), &sealed))
            .await
        {
            warn!(user_id = sealed.id, error = %e, "Failed to cache created user");
        }
        Ok(user)
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), ServiceError> {
        self.bounded_store("delete", self.repository.delete(id))
            .await?;

        let key = UserRecord::cache_key_for(id);
        if let Err(e) = self.bounded_cache("delete", self.cache.delete(&key)).await {
            warn!(user_id = id, error = %e, "Failed to evict deleted user, TTL will expire it");
        }
        Ok(())
    }

    /// Every user, emails decrypted, narrowed by `filter`.
    pub async fn list_users(&self, filter: &UserFilter) -> Result<Vec<UserRecord>, ServiceError> {
        let users = self
            .bounded_store("list_all", self.repository.list_all())
            .await?;

        let mut matched = Vec::new();
        for user in users {
            let user = self.reveal(user)?;
            if filter.matches(&user) {
                matched.push(user);
            }
        }
        Ok(matched)
    }

    pub async fn list_page(&self, limit: i64, offset: i64) -> Result<UserPage, ServiceError> {
        let users = self
            .bounded_store("list", self.repository.list(limit, offset))
            .await?;

        let is_last = users.is_empty() || (users.len() as i64) < limit;
        let users = users
            .into_iter()
            .map(|user| self.reveal(user))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(UserPage {
            users,
            offset,
            is_last,
        })
    }

    fn reveal(&self, user: UserRecord) -> Result<UserRecord, ServiceError> {
        let email = self.encryptor.decrypt(&user.email_address).map_err(|e| {
            warn!(user_id = user.id, error = %e, "Stored email could not be decrypted");
            e
        })?;
        Ok(UserRecord {
            email_address: email,
            ..user
        })
    }

    async fn bounded_store<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, RepositoryError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(RepositoryError::timeout(
                    operation,
                    self.timeout.as_millis() as u64,
                ))
            })
    }

    async fn bounded_cache<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(CacheError::timeout(
                    operation,
                    self.timeout.as_millis() as u64,
                ))
            })
    }
}
