//! The URL registry: creates short codes and resolves them.
//!
//! [`UrlRegistry`] ties together a durable store, a cache, a code
//! generator and the write-behind publisher. Reads go through
//! [`CachedRepository`], a cache-aside decorator that never lets a cache
//! failure fail a lookup.

pub mod cached;
pub mod config;
pub mod registry;

pub use cached::CachedRepository;
pub use config::{RegistryConfig, WriteMode};
pub use registry::UrlRegistry;
