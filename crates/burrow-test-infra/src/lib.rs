//! Disposable Redis and MySQL containers for integration tests.

pub mod mysql;
pub mod redis;

use thiserror::Error;

/// Failure to start a fixture container or to reach the server inside it.
#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("container failed: {0}")]
    Container(#[from] testcontainers::TestcontainersError),

    #[error("redis fixture unreachable: {0}")]
    Redis(#[from] ::redis::RedisError),
}

pub type Result<T> = std::result::Result<T, TestInfraError>;
