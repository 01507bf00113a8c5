use std::sync::Arc;
use std::time::Duration;

use burrow_core::{ReadRepository, ShortCode, Subscriber, UrlMapping};
use burrow_pipeline::{
    BatchConfig, BatchConsumer, MappingPublisher, MemoryChannel, RedisStreamPublisher,
    RedisStreamSubscriber,
};
use burrow_storage::InMemoryRepository;
use burrow_test_infra::redis::RedisServer;

const STREAM: &str = "test:mappings";
const GROUP: &str = "test-flusher";

fn mapping(i: usize) -> UrlMapping {
    UrlMapping::new(
        ShortCode::new_unchecked(format!("redis{i:03}")),
        format!("https://example.com/{i}"),
    )
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn stream_messages_reach_the_store() {
    let server = RedisServer::new().await.expect("start redis");
    let subscriber = RedisStreamSubscriber::new(
        server.blocking_connection().await.unwrap(),
        STREAM,
        GROUP,
        "consumer-1",
    );
    subscriber.ensure_group().await.unwrap();
    let publisher = MappingPublisher::new(RedisStreamPublisher::new(
        server.connection().await.unwrap(),
        STREAM,
    ));

    let repository = Arc::new(InMemoryRepository::new());
    let handle = BatchConsumer::new(
        subscriber,
        Arc::clone(&repository),
        MemoryChannel::new(),
        BatchConfig::builder()
            .max_batch_size(10)
            .max_wait(Duration::from_millis(200))
            .build(),
    )
    .spawn();

    for i in 0..5 {
        publisher.publish(&mapping(i)).await.unwrap();
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while repository.len() < 5 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    handle.shutdown().await.unwrap();

    assert_eq!(repository.len(), 5);
    let stored = repository.find_by_code(&mapping(3).code).await.unwrap().unwrap();
    assert_eq!(stored.original_url, "https://example.com/3");
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn unacknowledged_entries_are_redelivered() {
    let server = RedisServer::new().await.expect("start redis");
    let publisher = RedisStreamPublisher::new(server.connection().await.unwrap(), STREAM);
    let first = RedisStreamSubscriber::new(
        server.blocking_connection().await.unwrap(),
        STREAM,
        GROUP,
        "consumer-1",
    );
    first.ensure_group().await.unwrap();

    MappingPublisher::new(publisher)
        .publish(&mapping(1))
        .await
        .unwrap();

    let delivered = first.receive(10, Duration::from_millis(500)).await.unwrap();
    assert_eq!(delivered.len(), 1);

    // Same consumer name after a restart: the pending entry comes back.
    let restarted = RedisStreamSubscriber::new(
        server.blocking_connection().await.unwrap(),
        STREAM,
        GROUP,
        "consumer-1",
    );
    let again = restarted.receive(10, Duration::from_millis(500)).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].handle, delivered[0].handle);

    restarted.ack(&[again[0].handle.clone()]).await.unwrap();
    let fresh = RedisStreamSubscriber::new(
        server.blocking_connection().await.unwrap(),
        STREAM,
        GROUP,
        "consumer-1",
    );
    assert!(fresh
        .receive(10, Duration::from_millis(100))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn entry_arriving_late_in_a_blocking_read_is_delivered() {
    let server = RedisServer::new().await.expect("start redis");
    let subscriber = RedisStreamSubscriber::new(
        server.blocking_connection().await.unwrap(),
        STREAM,
        GROUP,
        "consumer-1",
    );
    subscriber.ensure_group().await.unwrap();
    let publisher = MappingPublisher::new(RedisStreamPublisher::new(
        server.connection().await.unwrap(),
        STREAM,
    ));

    // Drain the empty pending list so the next read blocks on new entries.
    assert!(subscriber
        .receive(10, Duration::from_millis(10))
        .await
        .unwrap()
        .is_empty());

    let late = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        publisher.publish(&mapping(7)).await.unwrap();
    });

    let mut delivered = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while delivered.is_empty() && tokio::time::Instant::now() < deadline {
        if let Ok(batch) = subscriber.receive(10, Duration::from_secs(1)).await {
            delivered = batch;
        }
    }
    late.await.unwrap();

    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].partition_key, mapping(7).code.as_str());
}
