use async_trait::async_trait;
use burrow_core::repository::{ReadRepository, Result};
use burrow_core::{ShortCode, UrlCache, UrlMapping};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A read-only repository decorator that adds cache-aside lookups.
///
/// `find_by_code` consults the cache first and falls back to the inner
/// repository, writing hits back with the configured TTL. Cache errors and
/// timeouts are logged and treated as misses, so the store is always
/// reached when the cache cannot answer. Other reads pass through.
#[derive(Debug, Clone)]
pub struct CachedRepository<R, C> {
    inner: R,
    cache: C,
    ttl: Duration,
    cache_timeout: Duration,
}

impl<R: ReadRepository, C: UrlCache> CachedRepository<R, C> {
    /// Creates a decorator with a 60 second TTL and a 250 ms cache timeout.
    pub fn new(inner: R, cache: C) -> Self {
        Self {
            inner,
            cache,
            ttl: Duration::from_secs(60),
            cache_timeout: Duration::from_millis(250),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    /// Returns a reference to the inner repository.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Returns a reference to the cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Writes `mapping` to the cache, ignoring failures.
    pub async fn prime(&self, mapping: &UrlMapping) {
        let write = self
            .cache
            .set_mapping(&mapping.code, mapping, Some(self.ttl));
        match tokio::time::timeout(self.cache_timeout, write).await {
            Ok(Ok(())) => trace!(code = %mapping.code, "cache primed"),
            Ok(Err(e)) => warn!(code = %mapping.code, error = %e, "cache write failed"),
            Err(_) => warn!(code = %mapping.code, "cache write timed out"),
        }
    }

    async fn cached(&self, code: &ShortCode) -> Option<UrlMapping> {
        match tokio::time::timeout(self.cache_timeout, self.cache.get_mapping(code)).await {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                warn!(code = %code, error = %e, "cache read failed, falling back to store");
                None
            }
            Err(_) => {
                warn!(code = %code, "cache read timed out, falling back to store");
                None
            }
        }
    }
}

#[async_trait]
impl<R: ReadRepository, C: UrlCache> ReadRepository for CachedRepository<R, C> {
    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlMapping>> {
        if let Some(mapping) = self.cached(code).await {
            debug!(code = %code, "cache hit");
            return Ok(Some(mapping));
        }

        trace!(code = %code, "cache miss, reading store");
        let found = self.inner.find_by_code(code).await?;
        if let Some(ref mapping) = found {
            self.prime(mapping).await;
        }
        Ok(found)
    }

    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<UrlMapping>> {
        self.inner.find_by_original_url(original_url).await
    }

    /// A cached code counts as taken, which also covers codes that are
    /// cached but still in flight to the store.
    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        if self.cached(code).await.is_some() {
            return Ok(true);
        }
        self.inner.exists(code).await
    }
}
