use std::time::Duration;
use typed_builder::TypedBuilder;

/// How a newly minted mapping reaches the durable store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Publish to the write-behind channel and return before it is durable.
    #[default]
    WriteBehind,
    /// Insert into the store before returning.
    WriteThrough,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct RegistryConfig {
    /// TTL of cache entries written by the registry.
    #[builder(default = Duration::from_secs(60))]
    pub cache_ttl: Duration,
    /// Bound on a single cache call; a slower cache counts as a miss.
    #[builder(default = Duration::from_millis(250))]
    pub cache_timeout: Duration,
    /// Bound on a single store call; exceeding it is an upstream error.
    #[builder(default = Duration::from_secs(2))]
    pub store_timeout: Duration,
    /// Candidate codes tried before creation gives up.
    #[builder(default = 8)]
    pub max_code_attempts: u32,
    #[builder(default)]
    pub write_mode: WriteMode,
    /// Write a new mapping to the cache right after creating it.
    #[builder(default = true)]
    pub cache_on_create: bool,
    /// How long a URL stays in the in-flight index after its code is minted.
    ///
    /// Should comfortably exceed the pipeline's flush latency. A mapping the
    /// pipeline dead-letters is still answered from the index until then.
    #[builder(default = Duration::from_secs(600))]
    pub pending_ttl: Duration,
    #[builder(default = 100_000)]
    pub pending_capacity: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
