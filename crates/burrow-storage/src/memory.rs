use async_trait::async_trait;
use burrow_core::repository::{ReadRepository, Repository, Result};
use burrow_core::{ShortCode, StorageError, UrlMapping};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// In-memory implementation of the repository contract using DashMap.
///
/// Mappings are keyed by code; a second index maps each original URL to
/// the first code stored for it. DashMap's sharded locks let concurrent
/// readers and writers touch different buckets without blocking.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    by_code: DashMap<String, UrlMapping>,
    by_url: DashMap<String, ShortCode>,
}

impl InMemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory repository with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            by_code: DashMap::with_capacity(capacity),
            by_url: DashMap::with_capacity(capacity),
        }
    }

    /// Number of stored mappings.
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Stores `mapping` unless its code is taken.
    ///
    /// Returns `Ok(true)` when a row was written, `Ok(false)` when the same
    /// mapping was already present.
    fn put(&self, mapping: UrlMapping) -> Result<bool> {
        match self.by_code.entry(mapping.code.as_str().to_owned()) {
            Entry::Occupied(existing) => {
                if existing.get().original_url == mapping.original_url {
                    Ok(false)
                } else {
                    Err(StorageError::Conflict(mapping.code.to_string()))
                }
            }
            Entry::Vacant(slot) => {
                self.by_url
                    .entry(mapping.original_url.clone())
                    .or_insert_with(|| mapping.code.clone());
                slot.insert(mapping);
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlMapping>> {
        Ok(self.by_code.get(code.as_str()).map(|entry| entry.clone()))
    }

    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<UrlMapping>> {
        let Some(code) = self.by_url.get(original_url).map(|entry| entry.clone()) else {
            return Ok(None);
        };
        self.find_by_code(&code).await
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        Ok(self.by_code.contains_key(code.as_str()))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert_one(&self, mapping: UrlMapping) -> Result<()> {
        self.put(mapping).map(|_| ())
    }

    async fn insert_batch(&self, mappings: Vec<UrlMapping>) -> Result<()> {
        for mapping in mappings {
            // Replayed codes are skipped whatever URL they carry.
            if let Err(StorageError::Conflict(code)) = self.put(mapping) {
                tracing::warn!(code = %code, "skipping batch row whose code is already taken");
            }
        }
        Ok(())
    }
}
