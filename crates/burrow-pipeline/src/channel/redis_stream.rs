use async_trait::async_trait;
use burrow_core::channel::{AckHandle, Delivery, Publisher, Result, Subscriber};
use burrow_core::ChannelError;
use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, AsyncConnectionConfig};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, info, trace};

const KEY_FIELD: &str = "key";
const PAYLOAD_FIELD: &str = "payload";

fn map_redis_error(operation: &str, err: redis::RedisError) -> ChannelError {
    let message = format!("{operation}: {err}");
    if err.is_timeout() {
        ChannelError::Timeout(message)
    } else if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
        ChannelError::Unavailable(message)
    } else {
        ChannelError::Operation(message)
    }
}

/// Connection settings for a subscriber's dedicated connection.
///
/// Multiplexed connections time out responses after 500 ms by default,
/// which is shorter than a typical `XREADGROUP ... BLOCK`.
pub fn blocking_connection_config() -> AsyncConnectionConfig {
    AsyncConnectionConfig::new().set_response_timeout(None)
}

/// Appends messages to a Redis Stream with `XADD`.
///
/// A stream is a single ordered log, so messages sharing a partition key
/// keep their publish order.
#[derive(Debug, Clone)]
pub struct RedisStreamPublisher<C = MultiplexedConnection> {
    conn: C,
    stream: String,
}

impl<C> RedisStreamPublisher<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    pub fn new(conn: C, stream: impl Into<String>) -> Self {
        Self {
            conn,
            stream: stream.into(),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }
}

#[async_trait]
impl<C> Publisher for RedisStreamPublisher<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn publish(&self, partition_key: &str, payload: String) -> Result<()> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(
                &self.stream,
                "*",
                &[(KEY_FIELD, partition_key), (PAYLOAD_FIELD, payload.as_str())],
            )
            .await
            .map_err(|e| map_redis_error("failed to append to stream", e))?;
        trace!(stream = %self.stream, id = %id, partition_key, "appended message");
        Ok(())
    }
}

/// Reads a Redis Stream as a member of a consumer group.
///
/// Deliveries stay in the group's pending entries list until `XACK`. On
/// start, and after every `nack`, the subscriber first walks its own
/// pending entries from id `0` before asking for new ones (`>`), which is how
/// unacknowledged messages get redelivered after a crash or a failed flush.
/// Each pending entry is handed out once per walk.
///
/// Blocking reads hold the connection, so give the subscriber its own
/// connection rather than one shared with publishers, and one whose
/// response timeout is longer than any `wait` passed to `receive` (see
/// [`blocking_connection_config`]). A read that fails midway rewinds to the
/// pending entries, since Redis may already have assigned entries to this
/// consumer.
#[derive(Debug)]
pub struct RedisStreamSubscriber<C = MultiplexedConnection> {
    conn: C,
    stream: String,
    group: String,
    consumer: String,
    /// Where the next pending-entries read starts; `None` once caught up.
    pending_cursor: Mutex<Option<String>>,
}

impl<C> RedisStreamSubscriber<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    pub fn new(
        conn: C,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            pending_cursor: Mutex::new(Some("0".to_string())),
        }
    }

    /// Creates the stream and consumer group if they do not exist yet.
    pub async fn ensure_group(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "0")
            .await;

        match created {
            Ok(()) => {
                info!(stream = %self.stream, group = %self.group, "created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(map_redis_error("failed to create consumer group", e)),
        }
    }

    async fn read(&self, id: &str, options: &StreamReadOptions) -> Result<Vec<Delivery>> {
        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.stream], &[id], options)
            .await
            .map_err(|e| map_redis_error("failed to read from stream", e))?;

        let deliveries = reply
            .into_iter()
            .flat_map(|reply| reply.keys)
            .flat_map(|key| key.ids)
            .map(|entry| Delivery {
                partition_key: entry.get(KEY_FIELD).unwrap_or_default(),
                payload: entry.get(PAYLOAD_FIELD).unwrap_or_default(),
                handle: AckHandle::new(entry.id),
            })
            .collect();
        Ok(deliveries)
    }
}

#[async_trait]
impl<C> Subscriber for RedisStreamSubscriber<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(max);

        let cursor = self.pending_cursor.lock().clone();
        if let Some(cursor) = cursor {
            let pending = self.read(&cursor, &options).await?;
            let next = pending.last().map(|d| d.handle.as_str().to_string());
            *self.pending_cursor.lock() = next;
            if !pending.is_empty() {
                debug!(count = pending.len(), "redelivering pending stream entries");
                return Ok(pending);
            }
        }

        // BLOCK 0 would wait forever.
        let block_ms = usize::try_from(wait.as_millis()).unwrap_or(usize::MAX).max(1);
        let fresh = self.read(">", &options.block(block_ms)).await;
        if fresh.is_err() {
            // Redis may have assigned entries to us whose reply never arrived.
            *self.pending_cursor.lock() = Some("0".to_string());
        }
        fresh
    }

    async fn ack(&self, handles: &[AckHandle]) -> Result<()> {
        if handles.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = handles.iter().map(AckHandle::as_str).collect();
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(&self.stream, &self.group, &ids)
            .await
            .map_err(|e| map_redis_error("failed to acknowledge stream entries", e))?;
        Ok(())
    }

    async fn nack(&self, handles: &[AckHandle]) -> Result<()> {
        // Entries stay pending; the next receive re-reads them.
        if !handles.is_empty() {
            *self.pending_cursor.lock() = Some("0".to_string());
        }
        Ok(())
    }
}
