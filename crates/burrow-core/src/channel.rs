//! Contract of the ordered, at-least-once message channel that carries
//! pending mappings from the registry to the batch consumer.

use crate::error::ChannelError;
use async_trait::async_trait;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Opaque token identifying one delivery, used to acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AckHandle(String);

impl AckHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AckHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message handed to a subscriber, not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub partition_key: String,
    pub payload: String,
    pub handle: AckHandle,
}

/// Producer side of the channel.
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    /// Enqueues `payload` under `partition_key`.
    ///
    /// Messages sharing a partition key are delivered in publish order.
    async fn publish(&self, partition_key: &str, payload: String) -> Result<()>;
}

/// Consumer side of the channel.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Waits up to `wait` for messages and returns at most `max` of them.
    ///
    /// Returns as soon as at least one message is available. An empty
    /// vector means the wait elapsed with nothing to deliver.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>>;

    /// Marks deliveries as processed so they are never redelivered.
    async fn ack(&self, handles: &[AckHandle]) -> Result<()>;

    /// Gives deliveries back to the channel for redelivery.
    async fn nack(&self, handles: &[AckHandle]) -> Result<()>;
}

#[async_trait]
impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    async fn publish(&self, partition_key: &str, payload: String) -> Result<()> {
        (**self).publish(partition_key, payload).await
    }
}

#[async_trait]
impl<T: Subscriber + ?Sized> Subscriber for Arc<T> {
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>> {
        (**self).receive(max, wait).await
    }

    async fn ack(&self, handles: &[AckHandle]) -> Result<()> {
        (**self).ack(handles).await
    }

    async fn nack(&self, handles: &[AckHandle]) -> Result<()> {
        (**self).nack(handles).await
    }
}
