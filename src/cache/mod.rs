//! Redis-based caching layer for checkout
//!
//! Holds short-lived derived data (COD eligibility decisions, processed
//! webhook event ids). Every read path falls back to the source of truth when
//! Redis is unavailable.

pub mod cache;
pub mod error;
pub mod keys;

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::CacheConfig;

pub use cache::RedisCache;
use error::CacheError;

pub type RedisPool = Pool<RedisConnectionManager>;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_LIFETIME: Duration = Duration::from_secs(300);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the pool. An unreachable Redis at startup only logs a warning;
/// cache users degrade to the database.
pub async fn init_cache_pool(config: &CacheConfig) -> Result<RedisPool, CacheError> {
    info!(
        max_connections = config.max_connections,
        redis_url = %config.redis_url,
        "Initializing Redis cache pool"
    );

    let manager = RedisConnectionManager::new(config.redis_url.as_str()).map_err(|e| {
        error!(error = %e, "Failed to create Redis connection manager");
        CacheError::ConnectionError(e.to_string())
    })?;

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .min_idle(config.max_connections.min(2))
        .connection_timeout(CONNECTION_TIMEOUT)
        .max_lifetime(MAX_LIFETIME)
        .idle_timeout(IDLE_TIMEOUT)
        .build(manager)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to build Redis connection pool");
            CacheError::ConnectionError(e.to_string())
        })?;

    if let Err(e) = health_check(&pool).await {
        warn!(error = %e, "Initial Redis ping failed, continuing without a warm cache");
    }

    Ok(pool)
}

/// PING over a pooled connection
pub async fn health_check(pool: &RedisPool) -> Result<(), CacheError> {
    let mut conn = pool
        .get()
        .await
        .map_err(|e| CacheError::ConnectionError(e.to_string()))?;

    let _: String = redis::cmd("PING")
        .query_async(&mut *conn)
        .await
        .map_err(|e| CacheError::ConnectionError(e.to_string()))?;
    Ok(())
}

/// Log pool usage before the last handle is dropped
pub fn shutdown_cache_pool(pool: &RedisPool) {
    let state = pool.state();
    info!(
        connections = state.connections,
        idle = state.idle_connections,
        "Releasing Redis cache pool"
    );
}
