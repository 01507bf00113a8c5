//! [`UrlCache`] implementations: in-process (moka) and Redis.

pub mod moka;
pub mod redis;

pub use burrow_core::cache::{Result, UrlCache};
pub use burrow_core::CacheError;
pub use self::moka::{CacheConfig, MokaUrlCache};
pub use self::redis::RedisUrlCache;

use std::time::Duration;

/// TTL applied when a caller does not pass one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
