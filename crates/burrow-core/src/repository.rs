use crate::error::StorageError;
use crate::mapping::UrlMapping;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use std::sync::Arc;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A read-only view of the durable store.
///
/// This trait provides only the read operations from [`Repository`],
/// allowing decorators such as a cache-aside layer to wrap reads without
/// touching writes.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Retrieves the mapping for a given short code.
    /// Returns `None` if the code does not exist.
    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlMapping>>;

    /// Retrieves a mapping whose target is `original_url`.
    ///
    /// When more than one mapping exists for the same URL, the oldest wins.
    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<UrlMapping>>;

    /// Checks whether a short code is already taken.
    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        Ok(self.find_by_code(code).await?.is_some())
    }
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Inserts a single mapping.
    ///
    /// Inserting a mapping identical in code and URL to a stored one is a
    /// no-op. Returns `Err(Conflict)` if the code is mapped to another URL.
    async fn insert_one(&self, mapping: UrlMapping) -> Result<()>;

    /// Inserts a batch of mappings atomically.
    ///
    /// Codes that already exist are skipped, which makes replaying a batch
    /// after redelivery harmless. Either every new row is written or none is.
    async fn insert_batch(&self, mappings: Vec<UrlMapping>) -> Result<()>;
}

#[async_trait]
impl<T: ReadRepository + ?Sized> ReadRepository for Arc<T> {
    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlMapping>> {
        (**self).find_by_code(code).await
    }

    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<UrlMapping>> {
        (**self).find_by_original_url(original_url).await
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        (**self).exists(code).await
    }
}

#[async_trait]
impl<T: Repository + ?Sized> Repository for Arc<T> {
    async fn insert_one(&self, mapping: UrlMapping) -> Result<()> {
        (**self).insert_one(mapping).await
    }

    async fn insert_batch(&self, mappings: Vec<UrlMapping>) -> Result<()> {
        (**self).insert_batch(mappings).await
    }
}
