use crate::DEFAULT_TTL;
use async_trait::async_trait;
use burrow_core::cache::{Result, UrlCache};
use burrow_core::{ShortCode, UrlMapping};
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

#[derive(Debug, Clone)]
struct CachedEntry {
    mapping: UrlMapping,
    ttl: Duration,
}

/// Expires every entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, CachedEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// An in-memory cache implementation using Moka.
///
/// Each entry carries its own TTL, taken from the `set_mapping` call or
/// from the configured default. Suitable for single-node deployments and
/// for tests.
#[derive(Debug, Clone)]
pub struct MokaUrlCache {
    cache: Cache<String, CachedEntry>,
    default_ttl: Duration,
}

impl MokaUrlCache {
    /// Creates a cache holding up to 10,000 entries with the default TTL.
    pub fn new() -> Self {
        CacheConfig::builder().build().into()
    }

    /// Creates a cache with a custom capacity and default TTL.
    ///
    /// # Arguments
    ///
    /// * `max_capacity` - Maximum number of entries the cache can hold
    /// * `ttl` - TTL used when `set_mapping` is called without one
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        CacheConfig::builder()
            .max_capacity(max_capacity)
            .default_ttl(ttl)
            .build()
            .into()
    }

    /// Returns a builder for creating a custom cache configuration.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfig::builder()
    }
}

impl Default for MokaUrlCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlCache for MokaUrlCache {
    async fn get_mapping(&self, code: &ShortCode) -> Result<Option<UrlMapping>> {
        trace!(code = %code, "Fetching mapping from Moka cache");

        match self.cache.get(code.as_str()).await {
            Some(entry) => {
                debug!(code = %code, "Cache hit in Moka");
                Ok(Some(entry.mapping))
            }
            None => {
                trace!(code = %code, "Cache miss in Moka");
                Ok(None)
            }
        }
    }

    async fn set_mapping(
        &self,
        code: &ShortCode,
        mapping: &UrlMapping,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let entry = CachedEntry {
            mapping: mapping.clone(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        self.cache.insert(code.as_str().to_owned(), entry).await;
        debug!(code = %code, "Cached mapping in Moka");
        Ok(())
    }

    async fn del(&self, code: &ShortCode) -> Result<()> {
        self.cache.invalidate(code.as_str()).await;
        trace!(code = %code, "Removed mapping from Moka cache (if present)");
        Ok(())
    }
}

/// Configuration for creating a MokaUrlCache with custom settings.
#[derive(Debug, TypedBuilder)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold.
    #[builder(default = 10_000)]
    max_capacity: u64,
    /// TTL used when `set_mapping` is called without one.
    #[builder(default = DEFAULT_TTL)]
    default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<CacheConfig> for MokaUrlCache {
    fn from(config: CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        MokaUrlCache {
            cache,
            default_ttl: config.default_ttl,
        }
    }
}
