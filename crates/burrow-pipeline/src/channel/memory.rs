use async_trait::async_trait;
use burrow_core::channel::{AckHandle, Delivery, Publisher, Result, Subscriber};
use burrow_core::ChannelError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

/// Default number of unacknowledged messages a [`MemoryChannel`] holds.
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct Stored {
    id: u64,
    partition_key: String,
    payload: String,
}

impl Stored {
    fn delivery(&self) -> Delivery {
        Delivery {
            partition_key: self.partition_key.clone(),
            payload: self.payload.clone(),
            handle: AckHandle::new(self.id.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<Stored>,
    in_flight: HashMap<u64, Stored>,
    next_id: u64,
    closed: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
    capacity: usize,
}

/// A bounded, in-process FIFO channel with acknowledgements.
///
/// Messages leave the queue on delivery and stay in flight until acked.
/// `nack` puts them back at the head so they are delivered again before
/// anything published later. Queued plus in-flight messages never exceed
/// the capacity; publishing beyond it fails with [`ChannelError::Full`].
///
/// Clones share the same queue.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    inner: Arc<Inner>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                capacity,
            }),
        }
    }

    /// Messages waiting for delivery.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Messages delivered but not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    /// Stops accepting publishes.
    ///
    /// Subscribers drain what is queued, then receive [`ChannelError::Closed`].
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.notify.notify_waiters();
        self.inner.notify.notify_one();
    }

    fn take(&self, max: usize) -> Result<Option<Vec<Delivery>>> {
        let mut state = self.inner.state.lock();
        if state.queue.is_empty() {
            return if state.closed {
                Err(ChannelError::Closed("memory channel closed".to_string()))
            } else {
                Ok(None)
            };
        }

        let count = max.min(state.queue.len());
        let mut deliveries = Vec::with_capacity(count);
        for stored in state.queue.drain(..count).collect::<Vec<_>>() {
            deliveries.push(stored.delivery());
            state.in_flight.insert(stored.id, stored);
        }
        Ok(Some(deliveries))
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_handle(handle: &AckHandle) -> Option<u64> {
    handle.as_str().parse().ok()
}

#[async_trait]
impl Publisher for MemoryChannel {
    async fn publish(&self, partition_key: &str, payload: String) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(ChannelError::Closed("memory channel closed".to_string()));
            }
            if state.queue.len() + state.in_flight.len() >= self.inner.capacity {
                return Err(ChannelError::Full(format!(
                    "{} messages pending",
                    self.inner.capacity
                )));
            }

            let id = state.next_id;
            state.next_id += 1;
            state.queue.push_back(Stored {
                id,
                partition_key: partition_key.to_owned(),
                payload,
            });
            trace!(id, partition_key, "queued message");
        }
        self.inner.notify.notify_one();
        Ok(())
    }
}

#[async_trait]
impl Subscriber for MemoryChannel {
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let deadline = Instant::now() + wait;
        loop {
            if let Some(deliveries) = self.take(max)? {
                return Ok(deliveries);
            }
            if tokio::time::timeout_at(deadline, self.inner.notify.notified())
                .await
                .is_err()
            {
                return Ok(self.take(max)?.unwrap_or_default());
            }
        }
    }

    async fn ack(&self, handles: &[AckHandle]) -> Result<()> {
        let mut state = self.inner.state.lock();
        for id in handles.iter().filter_map(parse_handle) {
            state.in_flight.remove(&id);
        }
        Ok(())
    }

    async fn nack(&self, handles: &[AckHandle]) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            let mut returned: Vec<Stored> = handles
                .iter()
                .filter_map(parse_handle)
                .filter_map(|id| state.in_flight.remove(&id))
                .collect();
            // Lower ids were published first; keep that order at the head.
            returned.sort_by_key(|stored| stored.id);
            for stored in returned.into_iter().rev() {
                state.queue.push_front(stored);
            }
        }
        self.inner.notify.notify_one();
        Ok(())
    }
}
