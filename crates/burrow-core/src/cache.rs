use crate::error::CacheError;
use crate::mapping::UrlMapping;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// A cache for URL mappings.
///
/// This trait provides a domain-specific caching abstraction for [`UrlMapping`]s,
/// using [`ShortCode`] as the key. Implementations can use Redis, in-memory
/// caches, or other storage backends.
#[async_trait]
pub trait UrlCache: Send + Sync + 'static {
    /// Get a mapping from cache.
    ///
    /// Returns `Ok(None)` if the key is not in the cache.
    async fn get_mapping(&self, code: &ShortCode) -> Result<Option<UrlMapping>>;

    /// Store a mapping in cache with optional TTL.
    ///
    /// If `ttl` is `None`, the implementation's default expiration applies.
    async fn set_mapping(
        &self,
        code: &ShortCode,
        mapping: &UrlMapping,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Remove a mapping from cache.
    ///
    /// It is not an error if the key does not exist.
    async fn del(&self, code: &ShortCode) -> Result<()>;
}

#[async_trait]
impl<T: UrlCache + ?Sized> UrlCache for Arc<T> {
    async fn get_mapping(&self, code: &ShortCode) -> Result<Option<UrlMapping>> {
        (**self).get_mapping(code).await
    }

    async fn set_mapping(
        &self,
        code: &ShortCode,
        mapping: &UrlMapping,
        ttl: Option<Duration>,
    ) -> Result<()> {
        (**self).set_mapping(code, mapping, ttl).await
    }

    async fn del(&self, code: &ShortCode) -> Result<()> {
        (**self).del(code).await
    }
}
