//! In-process substitutes for the store, cache and cipher ports.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use user_ingest::cache::{CacheError, InMemoryUserCache, UserCache};
use user_ingest::encryption::{AesGcmEncryptor, EncryptionError, Encryptor};
use user_ingest::repository::{RepositoryError, UserRepository};
use user_ingest::UserRecord;

/// Store that keeps rows in memory, enforces unique ids the way a primary key
/// does, and remembers every committed bulk insert.
#[derive(Debug, Default)]
pub struct RecordingRepository {
    rows: Mutex<BTreeMap<i64, UserRecord>>,
    inserts: Mutex<Vec<Vec<UserRecord>>>,
    failure: Mutex<Option<RepositoryError>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row directly, bypassing the port.
    pub fn seed(&self, user: UserRecord) {
        self.rows.lock().insert(user.id, user);
    }

    /// Remove a row directly, bypassing the port.
    pub fn remove_raw(&self, id: i64) -> Option<UserRecord> {
        self.rows.lock().remove(&id)
    }

    /// Every call fails with `error` from now on.
    pub fn fail_with(&self, error: RepositoryError) {
        *self.failure.lock() = Some(error);
    }

    /// Every call sleeps for `delay` before doing anything.
    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn row(&self, id: i64) -> Option<UserRecord> {
        self.rows.lock().get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.rows.lock().keys().copied().collect()
    }

    /// Sizes of committed bulk inserts, smallest first
    pub fn insert_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.inserts.lock().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        sizes
    }

    async fn pause(&self) -> Result<(), RepositoryError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failure.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl UserRepository for RecordingRepository {
    async fn bulk_insert(&self, users: &[UserRecord]) -> Result<(), RepositoryError> {
        self.pause().await?;

        {
            let mut rows = self.rows.lock();
            let mut batch_ids = HashSet::new();
            if users
                .iter()
                .any(|u| rows.contains_key(&u.id) || !batch_ids.insert(u.id))
            {
                return Err(RepositoryError::Duplicate);
            }
            for user in users {
                rows.insert(user.id, user.clone());
            }
        }

        self.inserts.lock().push(users.to_vec());
        Ok(())
    }

    async fn create(&self, user: &UserRecord) -> Result<(), RepositoryError> {
        self.pause().await?;

        let mut rows = self.rows.lock();
        if rows.contains_key(&user.id) {
            return Err(RepositoryError::Duplicate);
        }
        rows.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<UserRecord, RepositoryError> {
        self.pause().await?;
        self.row(id).ok_or(RepositoryError::NotFound)
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        self.pause().await?;
        Ok(self.rows.lock().values().cloned().collect())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<UserRecord>, RepositoryError> {
        self.pause().await?;
        Ok(self
            .rows
            .lock()
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        self.pause().await?;
        self.rows
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

/// In-memory cache that can be switched into failing every command.
#[derive(Debug)]
pub struct FlakyCache {
    inner: InMemoryUserCache,
    failing: AtomicBool,
    set_bulk_calls: AtomicUsize,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self {
            inner: InMemoryUserCache::new(Duration::from_secs(3600)),
            failing: AtomicBool::new(false),
            set_bulk_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        let cache = Self::new();
        cache.fail_all();
        cache
    }

    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn set_bulk_calls(&self) -> usize {
        self.set_bulk_calls.load(Ordering::SeqCst)
    }

    /// Read an entry regardless of the failure switch.
    pub async fn peek(&self, id: i64) -> Option<UserRecord> {
        self.inner
            .get(&UserRecord::cache_key_for(id))
            .await
            .ok()
            .flatten()
    }

    fn check(&self, command: &str) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::command(command, "connection reset by peer"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserCache for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<UserRecord>, CacheError> {
        self.check("GET")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, user: &UserRecord) -> Result<(), CacheError> {
        self.check("SET")?;
        self.inner.set(key, user).await
    }

    async fn set_bulk(&self, users: &[UserRecord]) -> Result<(), CacheError> {
        self.set_bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.check("MULTI")?;
        self.inner.set_bulk(users).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check("DEL")?;
        self.inner.delete(key).await
    }
}

/// Real AES-GCM cipher that refuses to encrypt a chosen set of plaintexts.
pub struct PoisonedEncryptor {
    inner: AesGcmEncryptor,
    poisoned: HashSet<String>,
}

impl PoisonedEncryptor {
    pub fn new(poisoned: impl IntoIterator<Item = String>) -> Self {
        Self {
            inner: super::encryptor(),
            poisoned: poisoned.into_iter().collect(),
        }
    }

    /// Refuses everything.
    pub fn always_failing() -> AlwaysFailingEncryptor {
        AlwaysFailingEncryptor
    }
}

impl Encryptor for PoisonedEncryptor {
    fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        if self.poisoned.contains(plaintext) {
            return Err(EncryptionError::EncryptFailed);
        }
        self.inner.encrypt(plaintext)
    }

    fn decrypt(&self, token: &str) -> Result<String, EncryptionError> {
        self.inner.decrypt(token)
    }
}

pub struct AlwaysFailingEncryptor;

impl Encryptor for AlwaysFailingEncryptor {
    fn encrypt(&self, _plaintext: &str) -> Result<String, EncryptionError> {
        Err(EncryptionError::EncryptFailed)
    }

    fn decrypt(&self, _token: &str) -> Result<String, EncryptionError> {
        Err(EncryptionError::DecryptFailed)
    }
}
