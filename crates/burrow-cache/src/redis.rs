use crate::DEFAULT_TTL;
use async_trait::async_trait;
use burrow_core::cache::{Result, UrlCache};
use burrow_core::{CacheError, ShortCode, UrlMapping};
use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A Redis-based implementation of [`UrlCache`].
///
/// Mappings are stored as JSON strings under `key_prefix + code` with
/// `SET EX`. Works over any async connection, e.g. a
/// [`MultiplexedConnection`] or a reconnecting `ConnectionManager` (redis
/// `connection-manager` feature).
#[derive(Debug, Clone)]
pub struct RedisUrlCache<C = MultiplexedConnection> {
    conn: C,
    key_prefix: String,
    default_ttl: Duration,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CacheError {
    let message = format!("{operation}: {err}");
    if err.is_timeout() {
        CacheError::Timeout(message)
    } else if err.is_connection_dropped() || err.is_connection_refusal() {
        CacheError::Unavailable(message)
    } else {
        CacheError::Operation(message)
    }
}

/// Redis expiries are whole seconds; anything shorter rounds up to one.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

impl<C> RedisUrlCache<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    /// Creates a new Redis URL cache using the `burrow:url:` key prefix.
    pub fn new(conn: C) -> Self {
        Self::with_prefix(conn, "burrow:url:")
    }

    /// Creates a new Redis URL cache with a custom key prefix.
    ///
    /// # Arguments
    ///
    /// * `conn` - An async Redis connection
    /// * `key_prefix` - Custom prefix for cache keys (e.g., "myapp:url:")
    pub fn with_prefix(conn: C, key_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Overrides the TTL used when `set_mapping` is called without one.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    fn cache_key(&self, code: &ShortCode) -> String {
        format!("{}{}", self.key_prefix, code.as_str())
    }
}

#[async_trait]
impl<C> UrlCache for RedisUrlCache<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn get_mapping(&self, code: &ShortCode) -> Result<Option<UrlMapping>> {
        let key = self.cache_key(code);
        trace!(code = %code, "Fetching mapping from Redis cache");

        let mut conn = self.conn.clone();
        let cached = conn
            .get::<_, Option<String>>(&key)
            .await
            .map_err(|e| map_redis_error("failed to fetch value from Redis", e))?;

        let Some(cached) = cached else {
            trace!(code = %code, "Cache miss in Redis");
            return Ok(None);
        };

        debug!(code = %code, "Cache hit in Redis");
        serde_json::from_str::<UrlMapping>(&cached)
            .map(Some)
            .map_err(|e| {
                warn!(code = %code, error = %e, "Failed to deserialize cached mapping");
                CacheError::InvalidData(format!("invalid cached value for key '{key}': {e}"))
            })
    }

    async fn set_mapping(
        &self,
        code: &ShortCode,
        mapping: &UrlMapping,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let key = self.cache_key(code);
        let json = serde_json::to_string(mapping)
            .map_err(|e| CacheError::Serialization(format!("failed to serialize cache value: {e}")))?;
        let seconds = ttl_seconds(ttl.unwrap_or(self.default_ttl));

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&key, json, seconds)
            .await
            .map_err(|e| map_redis_error("failed to write value to Redis", e))?;

        debug!(code = %code, ttl_secs = seconds, "Cached mapping in Redis");
        Ok(())
    }

    async fn del(&self, code: &ShortCode) -> Result<()> {
        let key = self.cache_key(code);

        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&key)
            .await
            .map_err(|e| map_redis_error("failed to delete value from Redis", e))?;

        trace!(code = %code, "Removed mapping from Redis cache");
        Ok(())
    }
}
