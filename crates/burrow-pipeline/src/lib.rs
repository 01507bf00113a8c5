//! Write-behind pipeline for URL mappings.
//!
//! The registry hands freshly minted mappings to a [`MappingPublisher`],
//! which encodes them as [`MappingMessage`]s on an ordered, at-least-once
//! channel. A [`BatchConsumer`] drains the channel, groups deliveries into
//! batches by size or age and writes each batch to the durable store with a
//! single bulk insert before acknowledging it.

pub mod channel;
pub mod consumer;
pub mod message;
pub mod publisher;

pub use channel::memory::MemoryChannel;
pub use channel::redis_stream::{
    blocking_connection_config, RedisStreamPublisher, RedisStreamSubscriber,
};
pub use consumer::{BatchConfig, BatchConsumer, ConsumerHandle};
pub use message::{DeadLetter, MappingMessage, MessageError};
pub use publisher::{MappingPublisher, PublishConfig};
