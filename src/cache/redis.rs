//! Redis adapter for [`UserCache`] over a `bb8` connection pool.
//!
//! Values are the JSON encoding of [`UserRecord`], written with `SETEX` so
//! every entry carries the configured TTL. `set_bulk` pipelines one `SETEX`
//! per record inside `MULTI`/`EXEC`.

use async_trait::async_trait;
use bb8_redis::bb8::{Pool, PooledConnection};
use bb8_redis::redis::{self, AsyncCommands};
use bb8_redis::RedisConnectionManager;
use tracing::{debug, info};

use super::{CacheError, UserCache};
use crate::config::RedisConfig;
use crate::models::UserRecord;

#[derive(Clone)]
pub struct RedisUserCache {
    pool: Pool<RedisConnectionManager>,
    ttl_seconds: u64,
}

impl std::fmt::Debug for RedisUserCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisUserCache")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl RedisUserCache {
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .map_err(|e| CacheError::connection(e.to_string()))?;
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .build(manager)
            .await
            .map_err(|e| CacheError::connection(e.to_string()))?;

        info!(
            pool_size = config.pool_size,
            ttl_seconds = config.ttl_seconds,
            "🗄️ CACHE: Redis pool established"
        );

        Ok(Self {
            pool,
            ttl_seconds: config.ttl_seconds,
        })
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    async fn connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::connection(e.to_string()))
    }
}

fn encode(key: &str, user: &UserRecord) -> Result<String, CacheError> {
    serde_json::to_string(user).map_err(|e| CacheError::serialization(key, e.to_string()))
}

#[async_trait]
impl UserCache for RedisUserCache {
    async fn get(&self, key: &str) -> Result<Option<UserRecord>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::command("GET", e.to_string()))?;

        raw.map(|value| {
            serde_json::from_str(&value).map_err(|e| CacheError::serialization(key, e.to_string()))
        })
        .transpose()
    }

    async fn set(&self, key: &str, user: &UserRecord) -> Result<(), CacheError> {
        let value = encode(key, user)?;
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, self.ttl_seconds)
            .await
            .map_err(|e| CacheError::command("SETEX", e.to_string()))
    }

    async fn set_bulk(&self, users: &[UserRecord]) -> Result<(), CacheError> {
        if users.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for user in users {
            let key = user.cache_key();
            let value = encode(&key, user)?;
            pipe.set_ex(key, value, self.ttl_seconds).ignore();
        }

        let mut conn = self.connection().await?;
        pipe.query_async::<()>(&mut *conn)
            .await
            .map_err(|e| CacheError::command("MULTI SETEX", e.to_string()))?;

        debug!(record_count = users.len(), "🗄️ CACHE: Bulk set complete");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::command("DEL", e.to_string()))
    }
}
