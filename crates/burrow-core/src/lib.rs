//! Core types and traits for the Burrow URL shortener.
//!
//! This crate holds the pieces shared by the registry, the storage and
//! cache adapters and the write-behind pipeline: the [`ShortCode`] and
//! [`UrlMapping`] types, the error taxonomy and the collaborator traits.

pub mod cache;
pub mod channel;
pub mod error;
pub mod mapping;
pub mod repository;
pub mod shortcode;
pub mod shortener;

pub use cache::UrlCache;
pub use channel::{AckHandle, Delivery, Publisher, Subscriber};
pub use error::{CacheError, ChannelError, CoreError, ShortenerError, StorageError};
pub use mapping::UrlMapping;
pub use repository::{ReadRepository, Repository};
pub use shortcode::ShortCode;
pub use shortener::{Shortened, ShortenStatus, Shortener};
