//! In-process [`UserCache`] backed by `DashMap`, with the same TTL semantics
//! as the Redis adapter. Expired entries are dropped lazily on read.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{CacheError, UserCache};
use crate::models::UserRecord;

#[derive(Debug)]
struct Entry {
    user: UserRecord,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct InMemoryUserCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl InMemoryUserCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Live (unexpired) entry count
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, key: String, user: UserRecord) {
        self.entries.insert(
            key,
            Entry {
                user,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

#[async_trait]
impl UserCache for InMemoryUserCache {
    async fn get(&self, key: &str) -> Result<Option<UserRecord>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.user.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, user: &UserRecord) -> Result<(), CacheError> {
        self.insert(key.to_string(), user.clone());
        Ok(())
    }

    async fn set_bulk(&self, users: &[UserRecord]) -> Result<(), CacheError> {
        for user in users {
            self.insert(user.cache_key(), user.clone());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> UserRecord {
        UserRecord {
            id,
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email_address: "token".to_string(),
            created_at: None,
            deleted_at: None,
            merged_at: None,
            parent_user_id: 0,
        }
    }

    #[tokio::test]
    async fn test_set_bulk_keys_by_id() {
        let cache = InMemoryUserCache::new(Duration::from_secs(60));
        cache.set_bulk(&[user(1), user(2)]).await.unwrap();

        assert_eq!(cache.get("1").await.unwrap(), Some(user(1)));
        assert_eq!(cache.get("2").await.unwrap(), Some(user(2)));
        assert_eq!(cache.get("3").await.unwrap(), None);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = InMemoryUserCache::new(Duration::from_secs(5));
        cache.set("7", &user(7)).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.get("7").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("7").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let cache = InMemoryUserCache::new(Duration::from_secs(60));
        cache.set("9", &user(9)).await.unwrap();
        cache.delete("9").await.unwrap();
        assert!(cache.get("9").await.unwrap().is_none());
    }
}
