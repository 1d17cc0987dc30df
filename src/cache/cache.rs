//! JSON value cache over the Redis pool

use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::CacheResult;
use super::RedisPool;

#[derive(Clone)]
pub struct RedisCache {
    pool: RedisPool,
    default_ttl: Duration,
}

impl RedisCache {
    pub fn new(pool: RedisPool, default_ttl: Duration) -> Self {
        Self { pool, default_ttl }
    }

    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &impl Display) -> CacheResult<Option<T>> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = conn.get(key.to_string()).await?;
        match raw {
            Some(json) => {
                debug!(key = %key, "cache hit");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(
        &self,
        key: &impl Display,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let json = serde_json::to_string(value)?;
        let ttl = ttl.unwrap_or(self.default_ttl).as_secs().max(1);
        let mut conn = self.pool.get().await?;
        let _: () = conn.set_ex(key.to_string(), json, ttl).await?;
        Ok(())
    }

    /// Set only when absent; returns true when this call stored the value
    pub async fn set_if_absent(&self, key: &impl Display, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.pool.get().await?;
        let stored: Option<String> = redis::cmd("SET")
            .arg(key.to_string())
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut *conn)
            .await?;
        Ok(stored.is_some())
    }

    pub async fn delete(&self, key: &impl Display) -> CacheResult<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.del(key.to_string()).await?;
        Ok(())
    }

    /// Read-through helper that treats cache failures as misses
    pub async fn get_or_warn<T: DeserializeOwned>(&self, key: &impl Display) -> Option<T> {
        match self.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed, falling back to source");
                None
            }
        }
    }

    pub async fn set_or_warn<T: Serialize>(&self, key: &impl Display, value: &T, ttl: Option<Duration>) {
        if let Err(e) = self.set(key, value, ttl).await {
            warn!(key = %key, error = %e, "cache write failed");
        }
    }
}
