use crate::cached::CachedRepository;
use crate::config::{RegistryConfig, WriteMode};
use async_trait::async_trait;
use burrow_core::{
    Publisher, ReadRepository, Repository, ShortCode, Shortened, Shortener, ShortenerError,
    StorageError, UrlCache, UrlMapping,
};
use burrow_generator::Generator;
use burrow_pipeline::MappingPublisher;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, ShortenerError>;

/// The URL registry.
///
/// Creation looks the URL up in the store, then in an index of creations
/// that are still on their way to the store, and only then mints a code.
/// Minting draws candidates from the generator until one is free in both
/// the cache and the store, then hands the mapping to the write path chosen
/// by [`WriteMode`].
///
/// The in-flight index coalesces concurrent creations of the same URL into
/// one mint, and answers repeated creations with the same code until the
/// pipeline has made the mapping durable. It is local to this process.
///
/// The index does not learn what happens to a mapping after publish. If the
/// pipeline dead-letters it, creations of the same URL keep returning that
/// code as `Existing` until the entry ages out after
/// [`RegistryConfig::pending_ttl`], while the code itself stops resolving
/// once its cache entry expires. Recovering such mappings means replaying
/// the dead letters.
pub struct UrlRegistry<R, C, G, P> {
    lookup: CachedRepository<R, C>,
    generator: G,
    publisher: MappingPublisher<P>,
    pending: Cache<String, ShortCode>,
    config: RegistryConfig,
}

impl<R, C, G, P> UrlRegistry<R, C, G, P>
where
    R: Repository,
    C: UrlCache,
    G: Generator,
    P: Publisher,
{
    pub fn new(
        repository: R,
        cache: C,
        generator: G,
        publisher: MappingPublisher<P>,
        config: RegistryConfig,
    ) -> Self {
        let lookup = CachedRepository::new(repository, cache)
            .with_ttl(config.cache_ttl)
            .with_cache_timeout(config.cache_timeout);
        let pending = Cache::builder()
            .max_capacity(config.pending_capacity)
            .time_to_live(config.pending_ttl)
            .build();

        Self {
            lookup,
            generator,
            publisher,
            pending,
            config,
        }
    }

    pub fn repository(&self) -> &R {
        self.lookup.inner()
    }

    pub fn cache(&self) -> &C {
        self.lookup.cache()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub async fn create_short_url(&self, original_url: &str) -> Result<Shortened> {
        if original_url.trim().is_empty() {
            return Err(ShortenerError::Validation(
                "original url cannot be empty".to_string(),
            ));
        }

        if let Some(existing) = self
            .bounded(
                "find_by_original_url",
                self.lookup.find_by_original_url(original_url),
            )
            .await?
        {
            debug!(code = %existing.code, "url already stored");
            return Ok(Shortened::existing(existing.code));
        }

        let entry = self
            .pending
            .entry(original_url.to_owned())
            .or_try_insert_with(self.mint(original_url))
            .await
            .map_err(Arc::unwrap_or_clone)?;

        if entry.is_fresh() {
            Ok(Shortened::created(entry.into_value()))
        } else {
            debug!(code = %entry.value(), "url creation already in flight");
            Ok(Shortened::existing(entry.into_value()))
        }
    }

    pub async fn resolve(&self, code: &str) -> Result<String> {
        self.get_info(code).await.map(|mapping| mapping.original_url)
    }

    pub async fn get_info(&self, code: &str) -> Result<UrlMapping> {
        let code = ShortCode::new(code)?;
        self.bounded("find_by_code", self.lookup.find_by_code(&code))
            .await?
            .ok_or_else(|| ShortenerError::NotFound(code.to_string()))
    }

    /// Mints a fresh code for `original_url` and hands the mapping off.
    async fn mint(&self, original_url: &str) -> Result<ShortCode> {
        let attempts = self.config.max_code_attempts.max(1);

        for attempt in 1..=attempts {
            let code: ShortCode = self.generator.generate().into();
            if self.bounded("exists", self.lookup.exists(&code)).await? {
                warn!(code = %code, attempt, "generated code is taken, retrying");
                continue;
            }

            let mapping = UrlMapping::new(code, original_url);
            match self.write(&mapping).await {
                Ok(()) => {}
                Err(ShortenerError::Storage(StorageError::Conflict(_))) => {
                    warn!(code = %mapping.code, attempt, "code claimed concurrently, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }

            if self.config.cache_on_create {
                self.lookup.prime(&mapping).await;
            }
            info!(code = %mapping.code, mode = ?self.config.write_mode, "short url created");
            return Ok(mapping.code);
        }

        Err(ShortenerError::CodeSpaceExhausted { attempts })
    }

    async fn write(&self, mapping: &UrlMapping) -> Result<()> {
        match self.config.write_mode {
            WriteMode::WriteBehind => self.publisher.publish(mapping).await?,
            WriteMode::WriteThrough => {
                self.bounded("insert_one", self.repository().insert_one(mapping.clone()))
                    .await?
            }
        }
        Ok(())
    }

    /// Runs a store call under the configured store timeout.
    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = std::result::Result<T, StorageError>>,
    ) -> std::result::Result<T, StorageError> {
        let limit = self.config.store_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = limit.as_millis() as u64, "store call timed out");
                Err(StorageError::Timeout(format!(
                    "{op} did not complete within {limit:?}"
                )))
            }
        }
    }
}

#[async_trait]
impl<R, C, G, P> Shortener for UrlRegistry<R, C, G, P>
where
    R: Repository,
    C: UrlCache,
    G: Generator,
    P: Publisher,
{
    async fn create_short_url(&self, original_url: &str) -> Result<Shortened> {
        UrlRegistry::create_short_url(self, original_url).await
    }

    async fn resolve(&self, code: &str) -> Result<String> {
        UrlRegistry::resolve(self, code).await
    }

    async fn get_info(&self, code: &str) -> Result<UrlMapping> {
        UrlRegistry::get_info(self, code).await
    }
}
