mod cli;

use crate::cli::Cli;
use anyhow::Context;
use burrow_pipeline::{
    blocking_connection_config, BatchConfig, BatchConsumer, RedisStreamPublisher,
    RedisStreamSubscriber,
};
use burrow_storage::MySqlRepository;
use burrow_telemetry::TelemetryConfig;
use clap::Parser;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse();

    burrow_telemetry::init(
        &TelemetryConfig::builder()
            .format(config.log_format.into())
            .build(),
    )?;

    info!(
        stream = %config.stream,
        dead_letter_stream = %config.dead_letter_stream,
        group = %config.group,
        consumer = %config.consumer,
        max_batch_size = config.max_batch_size,
        max_wait_ms = config.max_wait_ms,
        log_format = %config.log_format,
        "starting burrow flusher"
    );

    let client = redis::Client::open(config.redis_url.as_str()).context("invalid redis url")?;
    // Blocking stream reads get a connection of their own, without the
    // default response timeout.
    let reader = client
        .get_multiplexed_async_connection_with_config(&blocking_connection_config())
        .await
        .context("failed to connect to redis")?;
    let writer = redis::aio::ConnectionManager::new(client)
        .await
        .context("failed to connect to redis")?;

    let subscriber =
        RedisStreamSubscriber::new(reader, &config.stream, &config.group, &config.consumer);
    subscriber.ensure_group().await?;
    let dead_letters = RedisStreamPublisher::new(writer, &config.dead_letter_stream);

    let repository = MySqlRepository::connect(&config.mysql_dsn).await?;
    repository.ensure_schema().await?;

    let batch_config = BatchConfig::builder()
        .max_batch_size(usize::try_from(config.max_batch_size).unwrap_or(usize::MAX))
        .max_wait(Duration::from_millis(config.max_wait_ms))
        .max_flush_attempts(config.max_flush_attempts)
        .build();

    let consumer = BatchConsumer::new(subscriber, repository, dead_letters, batch_config).spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested, flushing buffered mappings");
    consumer.shutdown().await?;

    Ok(())
}
