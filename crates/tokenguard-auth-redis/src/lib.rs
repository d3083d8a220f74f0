//! Redis shared cache for tokenguard-auth
//!
//! [`RedisCache`] implements [`SharedCache`] on a `deadpool-redis` pool so the
//! access token denylist and the rate limit counters are shared by every
//! service instance. [`create_shared_cache`] picks the backend from
//! configuration.
//!
//! # Example
//!
//! ```ignore
//! let cache = tokenguard_auth_redis::create_shared_cache(&config.cache).await;
//! let sessions = SessionService::new(&config, credentials, refresh_tokens, cache.clone());
//! let limiter = RateLimiter::new(cache, config.cache.timeout);
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, Runtime};
use redis::AsyncCommands;
use tokenguard_auth::config::{CacheBackendKind, CacheConfig};
use tokenguard_auth::storage::{SharedCache, with_timeout};
use tokenguard_auth::{AuthError, AuthResult, LocalCache};

/// Increments `KEYS[1]` and sets its expiry to `ARGV[1]` milliseconds when
/// the increment created it. Runs atomically on the server.
const INCREMENT_SCRIPT: &str = r#"
local value = redis.call('INCR', KEYS[1])
if value == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return value
"#;

// =============================================================================
// Error Types
// =============================================================================

/// Errors from the Redis cache backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Redis command failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// No pooled connection could be obtained.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// The pool could not be built from configuration.
    #[error("Redis pool configuration error: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    /// Required configuration is missing.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Redis(_) | StorageError::Pool(_) => AuthError::transient(e.to_string()),
            StorageError::CreatePool(_) | StorageError::InvalidConfig(_) => {
                AuthError::configuration(e.to_string())
            }
        }
    }
}

/// Result type for cache operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Redis Cache
// =============================================================================

/// [`SharedCache`] backed by Redis.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
    timeout: Duration,
    increment: Arc<redis::Script>,
}

impl RedisCache {
    /// Wraps an existing pool.
    #[must_use]
    pub fn new(pool: Pool, timeout: Duration) -> Self {
        Self {
            pool,
            timeout,
            increment: Arc::new(redis::Script::new(INCREMENT_SCRIPT)),
        }
    }

    /// Builds a pool from the `cache` configuration section and checks that a
    /// connection can be made.
    ///
    /// # Errors
    ///
    /// Returns an error if no URL is configured, the pool cannot be built, or
    /// the first connection fails.
    pub async fn connect(config: &CacheConfig) -> StorageResult<Self> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| StorageError::InvalidConfig("cache.redis_url is not set".into()))?;

        let mut redis_config = deadpool_redis::Config::from_url(url);
        if let Some(ref mut pool_config) = redis_config.pool {
            pool_config.max_size = config.pool_size;
            pool_config.timeouts.wait = Some(config.timeout);
            pool_config.timeouts.create = Some(config.timeout);
            pool_config.timeouts.recycle = Some(config.timeout);
        } else {
            let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
            pool_config.timeouts.wait = Some(config.timeout);
            pool_config.timeouts.create = Some(config.timeout);
            pool_config.timeouts.recycle = Some(config.timeout);
            redis_config.pool = Some(pool_config);
        }

        let pool = redis_config.create_pool(Some(Runtime::Tokio1))?;
        drop(pool.get().await?);

        Ok(Self::new(pool, config.timeout))
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn connection(&self) -> StorageResult<Connection> {
        Ok(self.pool.get().await?)
    }

    async fn increment_inner(&self, key: &str, ttl: Duration) -> StorageResult<i64> {
        let mut conn = self.connection().await?;
        let value: i64 = self
            .increment
            .key(key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set_inner(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()> {
        let mut conn = self.connection().await?;
        conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl)).await?;
        Ok(())
    }

    async fn exists_inner(&self, key: &str) -> StorageResult<bool> {
        let mut conn = self.connection().await?;
        Ok(conn.exists::<_, bool>(key).await?)
    }
}

/// Redis rejects a zero expiry.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn increment_and_maybe_expire(&self, key: &str, ttl: Duration) -> AuthResult<i64> {
        with_timeout(self.timeout, "redis.increment", async {
            self.increment_inner(key, ttl).await.map_err(|e| {
                tracing::warn!(key = %key, error = %e, "Redis increment failed");
                AuthError::from(e)
            })
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<()> {
        with_timeout(self.timeout, "redis.set", async {
            self.set_inner(key, value, ttl).await.map_err(|e| {
                tracing::warn!(key = %key, error = %e, "Redis SET failed");
                AuthError::from(e)
            })
        })
        .await
    }

    async fn exists(&self, key: &str) -> AuthResult<bool> {
        with_timeout(self.timeout, "redis.exists", async {
            self.exists_inner(key).await.map_err(|e| {
                tracing::warn!(key = %key, error = %e, "Redis EXISTS failed");
                AuthError::from(e)
            })
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

// =============================================================================
// Backend Selection
// =============================================================================

/// Creates the shared cache named by configuration.
///
/// If Redis is configured but cannot be reached, falls back to an in-process
/// [`LocalCache`]. Counters and denylist entries are then per instance only.
pub async fn create_shared_cache(config: &CacheConfig) -> Arc<dyn SharedCache> {
    match config.backend {
        CacheBackendKind::Local => {
            tracing::info!("Using local shared cache");
            Arc::new(LocalCache::new())
        }
        CacheBackendKind::Redis => match RedisCache::connect(config).await {
            Ok(cache) => {
                tracing::info!(pool_size = config.pool_size, "Connected to Redis shared cache");
                Arc::new(cache)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to connect to Redis. Falling back to local cache."
                );
                Arc::new(LocalCache::new())
            }
        },
    }
}
