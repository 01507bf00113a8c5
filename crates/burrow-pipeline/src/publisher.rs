use crate::message::MappingMessage;
use burrow_core::{ChannelError, Publisher, UrlMapping};
use std::time::Duration;
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

/// Retry policy for publishing a mapping.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PublishConfig {
    /// Total attempts, including the first one.
    #[builder(default = 3)]
    pub max_attempts: u32,
    /// Delay before the first retry; doubles after each further failure.
    #[builder(default = Duration::from_millis(50))]
    pub backoff: Duration,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Publishes mappings onto the write-behind channel.
///
/// Each mapping is encoded as a [`MappingMessage`] and published under its
/// code as partition key. Retryable channel errors (full, unavailable,
/// timeout) are retried with backoff; once attempts run out the last error
/// is returned and the caller must treat the mapping as not created.
#[derive(Debug, Clone)]
pub struct MappingPublisher<P> {
    publisher: P,
    config: PublishConfig,
}

impl<P: Publisher> MappingPublisher<P> {
    pub fn new(publisher: P) -> Self {
        Self::with_config(publisher, PublishConfig::default())
    }

    pub fn with_config(publisher: P, config: PublishConfig) -> Self {
        Self { publisher, config }
    }

    /// Returns a reference to the underlying channel publisher.
    pub fn inner(&self) -> &P {
        &self.publisher
    }

    pub async fn publish(&self, mapping: &UrlMapping) -> Result<(), ChannelError> {
        let payload = MappingMessage::from(mapping).encode()?;
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.backoff;
        let mut attempt = 1;

        loop {
            match self
                .publisher
                .publish(mapping.code.as_str(), payload.clone())
                .await
            {
                Ok(()) => {
                    debug!(code = %mapping.code, attempt, "published mapping");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(code = %mapping.code, attempt, error = %e, "publish failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => {
                    warn!(code = %mapping.code, attempt, error = %e, "giving up on publish");
                    return Err(e);
                }
            }
        }
    }
}
