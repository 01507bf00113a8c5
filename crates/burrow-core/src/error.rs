use thiserror::Error;

/// Errors related to the core types of the URL shortener.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out: {0}")]
    Timeout(String),
    #[error("cache serialization failed: {0}")]
    Serialization(String),
    #[error("cache value is invalid: {0}")]
    InvalidData(String),
    #[error("cache initialization failed: {0}")]
    Initialization(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short code already mapped to a different url: {0}")]
    Conflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("channel is full: {0}")]
    Full(String),
    #[error("channel is closed: {0}")]
    Closed(String),
    #[error("channel backend unavailable: {0}")]
    Unavailable(String),
    #[error("channel operation timed out: {0}")]
    Timeout(String),
    #[error("message serialization failed: {0}")]
    Serialization(String),
    #[error("channel operation failed: {0}")]
    Operation(String),
}

impl ChannelError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChannelError::Full(_) | ChannelError::Unavailable(_) | ChannelError::Timeout(_)
        )
    }
}

/// Errors surfaced by the operations a [`Shortener`](crate::Shortener) exposes.
#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("no mapping for short code: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("no unused short code found after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },
}

impl ShortenerError {
    /// True for failures of a collaborator (store or channel) rather than of the input.
    pub fn is_upstream(&self) -> bool {
        matches!(self, ShortenerError::Storage(_) | ShortenerError::Channel(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ShortenerError::NotFound(_))
    }
}

impl From<CoreError> for ShortenerError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidShortCode(message) => Self::Validation(message),
        }
    }
}
