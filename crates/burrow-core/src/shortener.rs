use crate::mapping::UrlMapping;
use crate::shortcode::ShortCode;
use async_trait::async_trait;

type Result<T> = std::result::Result<T, crate::error::ShortenerError>;

/// Whether a creation minted a new code or returned a known one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortenStatus {
    /// A new code was minted and handed to the write path.
    Created,
    /// The URL already had a code, which is returned unchanged.
    Existing,
}

/// Outcome of a successful creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub code: ShortCode,
    pub status: ShortenStatus,
}

impl Shortened {
    pub fn created(code: ShortCode) -> Self {
        Self {
            code,
            status: ShortenStatus::Created,
        }
    }

    pub fn existing(code: ShortCode) -> Self {
        Self {
            code,
            status: ShortenStatus::Existing,
        }
    }
}

/// The operations offered to a request layer.
#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Returns the code for `original_url`, minting one if the URL is new.
    async fn create_short_url(&self, original_url: &str) -> Result<Shortened>;

    /// Resolves a short code to its original URL.
    ///
    /// Fails with `NotFound` if the code has no mapping.
    async fn resolve(&self, code: &str) -> Result<String>;

    /// Returns the full mapping behind a short code.
    async fn get_info(&self, code: &str) -> Result<UrlMapping>;
}
