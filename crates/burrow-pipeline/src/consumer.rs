use crate::message::{DeadLetter, MappingMessage};
use burrow_core::{
    AckHandle, ChannelError, Delivery, Publisher, Repository, StorageError, Subscriber, UrlMapping,
};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

/// Flush triggers and retry policy of a [`BatchConsumer`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct BatchConfig {
    /// Flush as soon as this many deliveries are buffered.
    #[builder(default = 200)]
    pub max_batch_size: usize,
    /// Flush once the oldest buffered delivery is this old.
    #[builder(default = Duration::from_millis(500))]
    pub max_wait: Duration,
    /// How long one receive call may block while the buffer is empty.
    #[builder(default = Duration::from_secs(1))]
    pub idle_poll: Duration,
    /// Insert attempts per batch before it is dead-lettered.
    #[builder(default = 3)]
    pub max_flush_attempts: u32,
    /// Delay before the first insert retry; doubles after each failure.
    #[builder(default = Duration::from_millis(100))]
    pub retry_backoff: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug)]
struct Buffered {
    mapping: UrlMapping,
    delivery: Delivery,
}

/// Drains the write-behind channel into the durable store in batches.
///
/// A single consumer owns its buffer. Deliveries are acknowledged only
/// after the bulk insert containing them succeeds. Batches whose insert
/// keeps failing go to the dead-letter publisher and are acknowledged once
/// dead-lettered; if even that fails they are handed back to the channel.
pub struct BatchConsumer<S, R, D> {
    subscriber: S,
    repository: R,
    dead_letters: D,
    config: BatchConfig,
}

/// Handle to a consumer running on its own task.
#[derive(Debug)]
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Asks the consumer to stop, waits for its final flush.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        let _ = self.shutdown.send(true);
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<S, R, D> BatchConsumer<S, R, D>
where
    S: Subscriber,
    R: Repository,
    D: Publisher,
{
    pub fn new(subscriber: S, repository: R, dead_letters: D, config: BatchConfig) -> Self {
        Self {
            subscriber,
            repository,
            dead_letters,
            config,
        }
    }

    /// Runs the consumer on a new tokio task.
    pub fn spawn(self) -> ConsumerHandle {
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(self.run(signal));
        ConsumerHandle { shutdown, task }
    }

    /// Consumes until `shutdown` turns true (or its sender is dropped) or
    /// the channel closes, then flushes whatever is buffered.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let max_batch_size = self.config.max_batch_size.max(1);
        let mut buffer: Vec<Buffered> = Vec::with_capacity(max_batch_size);
        let mut oldest: Option<Instant> = None;

        info!(
            max_batch_size,
            max_wait_ms = self.config.max_wait.as_millis() as u64,
            "batch consumer started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = match oldest {
                Some(since) => {
                    let remaining = self.config.max_wait.saturating_sub(since.elapsed());
                    if remaining.is_zero() {
                        self.flush(&mut buffer).await;
                        oldest = None;
                        continue;
                    }
                    remaining
                }
                None => self.config.idle_poll,
            };

            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.subscriber.receive(max_batch_size - buffer.len(), wait) => received,
            };

            match received {
                Ok(deliveries) => {
                    if !deliveries.is_empty() && oldest.is_none() {
                        oldest = Some(Instant::now());
                    }
                    self.accept(deliveries, &mut buffer).await;
                    if buffer.is_empty() {
                        oldest = None;
                    }
                }
                Err(ChannelError::Closed(_)) => {
                    info!("channel closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "receive failed");
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
            }

            if buffer.len() >= max_batch_size {
                self.flush(&mut buffer).await;
                oldest = None;
            }
        }

        self.flush(&mut buffer).await;
        info!("batch consumer stopped");
    }

    /// Decodes deliveries into the buffer, dead-lettering undecodable ones.
    ///
    /// Undecodable deliveries that cannot be dead-lettered go back to the
    /// channel, followed by one retry backoff.
    async fn accept(&self, deliveries: Vec<Delivery>, buffer: &mut Vec<Buffered>) {
        let mut returned = Vec::new();
        for delivery in deliveries {
            let decoded = MappingMessage::decode(&delivery.payload).and_then(MappingMessage::into_mapping);
            match decoded {
                Ok(mapping) => buffer.push(Buffered { mapping, delivery }),
                Err(e) => {
                    error!(
                        partition_key = %delivery.partition_key,
                        error = %e,
                        "undecodable message"
                    );
                    let reason = format!("decode failed: {e}");
                    let dead_lettered = self.dead_letter(&[&delivery], &reason).await;
                    match dead_lettered {
                        Ok(()) => self.acknowledge(&[delivery.handle]).await,
                        Err(dlq) => {
                            warn!(error = %dlq, "dead-lettering failed, returning message to the channel");
                            returned.push(delivery.handle);
                        }
                    }
                }
            }
        }

        if !returned.is_empty() {
            if let Err(e) = self.subscriber.nack(&returned).await {
                error!(error = %e, "failed to return messages to the channel");
            }
            tokio::time::sleep(self.config.retry_backoff).await;
        }
    }

    async fn flush(&self, buffer: &mut Vec<Buffered>) {
        if buffer.is_empty() {
            return;
        }

        let batch = std::mem::take(buffer);
        let handles: Vec<AckHandle> = batch.iter().map(|b| b.delivery.handle.clone()).collect();

        // Redeliveries of one message may share a batch; insert the code once.
        let mut seen = HashSet::new();
        let mappings: Vec<UrlMapping> = batch
            .iter()
            .filter(|b| seen.insert(b.mapping.code.clone()))
            .map(|b| b.mapping.clone())
            .collect();
        let rows = mappings.len();

        match self.persist(mappings).await {
            Ok(()) => {
                debug!(deliveries = batch.len(), rows, "flushed batch");
                self.acknowledge(&handles).await;
            }
            Err(e) => {
                error!(deliveries = batch.len(), error = %e, "batch insert failed, dead-lettering");
                let reason = format!("insert failed: {e}");
                let deliveries: Vec<&Delivery> = batch.iter().map(|b| &b.delivery).collect();
                match self.dead_letter(&deliveries, &reason).await {
                    Ok(()) => self.acknowledge(&handles).await,
                    Err(dlq) => {
                        error!(error = %dlq, "dead-lettering failed, returning batch to the channel");
                        if let Err(e) = self.subscriber.nack(&handles).await {
                            error!(error = %e, "failed to return batch to the channel");
                        }
                    }
                }
            }
        }
    }

    async fn persist(&self, mappings: Vec<UrlMapping>) -> Result<(), StorageError> {
        let max_attempts = self.config.max_flush_attempts.max(1);
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 1;

        loop {
            match self.repository.insert_batch(mappings.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < max_attempts => {
                    warn!(attempt, rows = mappings.len(), error = %e, "batch insert failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn dead_letter(&self, deliveries: &[&Delivery], reason: &str) -> Result<(), ChannelError> {
        for delivery in deliveries {
            let letter = DeadLetter {
                partition_key: delivery.partition_key.clone(),
                payload: delivery.payload.clone(),
                reason: reason.to_owned(),
            };
            self.dead_letters
                .publish(&delivery.partition_key, letter.encode()?)
                .await?;
        }
        Ok(())
    }

    async fn acknowledge(&self, handles: &[AckHandle]) {
        if let Err(e) = self.subscriber.ack(handles).await {
            // Unacked deliveries come back; the replayed insert is a no-op.
            warn!(count = handles.len(), error = %e, "failed to acknowledge deliveries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory::MemoryChannel;
    use crate::publisher::MappingPublisher;
    use async_trait::async_trait;
    use burrow_core::repository::{ReadRepository, Result as StoreResult};
    use burrow_core::ShortCode;
    use burrow_storage::InMemoryRepository;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Records every batch handed to it, failing the first `failures` calls.
    #[derive(Default)]
    struct RecordingRepository {
        inner: InMemoryRepository,
        batches: Mutex<Vec<(usize, Instant)>>,
        failures: AtomicU32,
    }

    impl RecordingRepository {
        fn failing(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                ..Self::default()
            }
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().iter().map(|(size, _)| *size).collect()
        }
    }

    #[async_trait]
    impl ReadRepository for RecordingRepository {
        async fn find_by_code(&self, code: &ShortCode) -> StoreResult<Option<UrlMapping>> {
            self.inner.find_by_code(code).await
        }

        async fn find_by_original_url(&self, url: &str) -> StoreResult<Option<UrlMapping>> {
            self.inner.find_by_original_url(url).await
        }
    }

    #[async_trait]
    impl Repository for RecordingRepository {
        async fn insert_one(&self, mapping: UrlMapping) -> StoreResult<()> {
            self.inner.insert_one(mapping).await
        }

        async fn insert_batch(&self, mappings: Vec<UrlMapping>) -> StoreResult<()> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StorageError::Unavailable("database down".to_string()));
            }
            self.batches.lock().push((mappings.len(), Instant::now()));
            self.inner.insert_batch(mappings).await
        }
    }

    struct Harness {
        channel: MemoryChannel,
        dead_letters: MemoryChannel,
        repository: Arc<RecordingRepository>,
        publisher: MappingPublisher<MemoryChannel>,
        handle: ConsumerHandle,
    }

    fn start(repository: RecordingRepository, config: BatchConfig) -> Harness {
        let channel = MemoryChannel::new();
        let dead_letters = MemoryChannel::new();
        let repository = Arc::new(repository);
        let handle = BatchConsumer::new(
            channel.clone(),
            Arc::clone(&repository),
            dead_letters.clone(),
            config,
        )
        .spawn();

        Harness {
            publisher: MappingPublisher::new(channel.clone()),
            channel,
            dead_letters,
            repository,
            handle,
        }
    }

    fn trigger_config() -> BatchConfig {
        BatchConfig::builder()
            .max_batch_size(3)
            .max_wait(Duration::from_millis(500))
            .build()
    }

    fn mapping(i: usize) -> UrlMapping {
        UrlMapping::new(
            ShortCode::new_unchecked(format!("code{i:04}")),
            format!("https://example.com/{i}"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn three_quick_publishes_flush_once_as_a_full_batch() {
        let h = start(RecordingRepository::default(), trigger_config());

        h.publisher.publish(&mapping(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        h.publisher.publish(&mapping(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        h.publisher.publish(&mapping(3)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(h.repository.batch_sizes(), vec![3]);
        assert_eq!(h.repository.inner.len(), 3);
        assert_eq!(h.channel.in_flight(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.repository.batch_sizes(), vec![3]);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lone_publish_flushes_after_max_wait() {
        let h = start(RecordingRepository::default(), trigger_config());
        let published_at = Instant::now();

        h.publisher.publish(&mapping(1)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(490)).await;
        assert!(h.repository.batch_sizes().is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let batches = h.repository.batches.lock().clone();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, 1);
        let waited = batches[0].1 - published_at;
        assert!(waited >= Duration::from_millis(500) && waited < Duration::from_millis(510));

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn redelivered_batch_does_not_corrupt_store() {
        let h = start(RecordingRepository::default(), trigger_config());
        let batch: Vec<_> = (1..=3).map(mapping).collect();

        for m in &batch {
            h.publisher.publish(m).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        // At-least-once: the same messages arrive again.
        for m in &batch {
            h.publisher.publish(m).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(h.repository.batch_sizes(), vec![3, 3]);
        assert_eq!(h.repository.inner.len(), 3);
        for m in &batch {
            let stored = h.repository.find_by_code(&m.code).await.unwrap().unwrap();
            assert_eq!(&stored, m);
        }
        assert!(h.dead_letters.receive(10, Duration::ZERO).await.unwrap().is_empty());
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_deliveries_in_one_batch_insert_once() {
        let h = start(RecordingRepository::default(), trigger_config());

        for _ in 0..3 {
            h.publisher.publish(&mapping(7)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(h.repository.batch_sizes(), vec![1]);
        assert_eq!(h.channel.in_flight(), 0);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn transient_insert_failure_is_retried() {
        let h = start(RecordingRepository::failing(2), trigger_config());

        for i in 1..=3 {
            h.publisher.publish(&mapping(i)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(h.repository.batch_sizes(), vec![3]);
        assert_eq!(h.channel.in_flight(), 0);
        assert!(h.dead_letters.receive(10, Duration::ZERO).await.unwrap().is_empty());
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_insert_failure_dead_letters_the_batch() {
        let h = start(RecordingRepository::failing(u32::MAX), trigger_config());

        for i in 1..=3 {
            h.publisher.publish(&mapping(i)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(h.repository.batch_sizes().is_empty());
        assert_eq!(h.channel.in_flight(), 0);

        let letters = h.dead_letters.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(letters.len(), 3);
        let first: DeadLetter = serde_json::from_str(&letters[0].payload).unwrap();
        assert_eq!(first.partition_key, "code0001");
        assert!(first.reason.starts_with("insert failed"));
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_batch_goes_back_to_channel_when_dead_letters_are_down() {
        let channel = MemoryChannel::new();
        let dead_letters = MemoryChannel::new();
        dead_letters.close();
        let repository = Arc::new(RecordingRepository::failing(3));
        let config = BatchConfig::builder()
            .max_batch_size(1)
            .max_flush_attempts(3)
            .build();
        let handle = BatchConsumer::new(
            channel.clone(),
            Arc::clone(&repository),
            dead_letters,
            config,
        )
        .spawn();

        MappingPublisher::new(channel.clone())
            .publish(&mapping(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        // First round exhausted its attempts and was nacked, the redelivery succeeded.
        assert_eq!(repository.batch_sizes(), vec![1]);
        assert_eq!(channel.in_flight(), 0);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_payload_is_dead_lettered_and_acked() {
        let h = start(RecordingRepository::default(), trigger_config());

        h.channel.publish("junk", "not json".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let letters = h.dead_letters.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(letters.len(), 1);
        let letter: DeadLetter = serde_json::from_str(&letters[0].payload).unwrap();
        assert_eq!(letter.payload, "not json");
        assert!(letter.reason.starts_with("decode failed"));
        assert_eq!(h.channel.in_flight(), 0);
        assert!(h.repository.batch_sizes().is_empty());
        h.handle.shutdown().await.unwrap();
    }

    /// Fails the first `failures` publishes, then forwards to a memory channel.
    struct Unreliable {
        failures: AtomicU32,
        inner: MemoryChannel,
    }

    #[async_trait]
    impl Publisher for Unreliable {
        async fn publish(&self, partition_key: &str, payload: String) -> burrow_core::channel::Result<()> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ChannelError::Unavailable("dead letter stream down".to_string()));
            }
            self.inner.publish(partition_key, payload).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_payload_waits_in_channel_while_dead_letters_are_down() {
        let channel = MemoryChannel::with_capacity(2);
        let dead_letters = MemoryChannel::new();
        let unreliable = Arc::new(Unreliable {
            failures: AtomicU32::new(3),
            inner: dead_letters.clone(),
        });
        let handle = BatchConsumer::new(
            channel.clone(),
            Arc::new(RecordingRepository::default()),
            Arc::clone(&unreliable),
            trigger_config(),
        )
        .spawn();

        channel.publish("junk-1", "not json".to_string()).await.unwrap();
        channel.publish("junk-2", "not json".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let letters = dead_letters.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(letters.len(), 2);
        assert_eq!(channel.in_flight(), 0);
        assert_eq!(channel.queued(), 0);

        // Capacity is free again.
        channel.publish("next", "not json".to_string()).await.unwrap();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_payload_is_not_stranded_in_flight() {
        let channel = MemoryChannel::new();
        let dead_letters = MemoryChannel::new();
        dead_letters.close();
        let handle = BatchConsumer::new(
            channel.clone(),
            Arc::new(RecordingRepository::default()),
            dead_letters,
            trigger_config(),
        )
        .spawn();

        channel.publish("junk", "not json".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Handed back and waiting for redelivery, not held by the consumer.
        assert_eq!(channel.in_flight(), 0);
        assert_eq!(channel.queued(), 1);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_partial_batch() {
        let h = start(RecordingRepository::default(), trigger_config());

        h.publisher.publish(&mapping(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.handle.shutdown().await.unwrap();

        assert_eq!(h.repository.batch_sizes(), vec![1]);
        assert_eq!(h.channel.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_channel_stops_the_consumer() {
        let h = start(RecordingRepository::default(), trigger_config());

        h.publisher.publish(&mapping(1)).await.unwrap();
        h.channel.close();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(h.handle.is_finished());
        assert_eq!(h.repository.batch_sizes(), vec![1]);
    }
}
