use std::time::Duration;

use burrow_core::{ShortCode, UrlMapping};
use burrow_storage::{MySqlRepository, ReadRepository, Repository, StorageError};
use burrow_test_infra::mysql::{MySqlServer, MysqlConfig};
use sqlx::mysql::MySqlPoolOptions;

struct Fixture {
    _mysql: MySqlServer,
    repo: MySqlRepository,
}

impl Fixture {
    async fn start() -> Self {
        let mysql = MySqlServer::new(MysqlConfig::builder().build())
            .await
            .expect("start mysql");
        let url = mysql.database_url().await.expect("mysql url");
        let pool = connect_with_retry(&url).await;

        let repo = MySqlRepository::new(pool);
        repo.ensure_schema().await.expect("create schema");

        Self {
            _mysql: mysql,
            repo,
        }
    }
}

async fn connect_with_retry(url: &str) -> sqlx::MySqlPool {
    let mut last_error = None;

    for _ in 0..20 {
        match MySqlPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
        {
            Ok(pool) => return pool,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect mysql: {last_error:?}");
}

fn code(value: &str) -> ShortCode {
    ShortCode::new_unchecked(value)
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn insert_and_find_by_code_and_url() {
    let fixture = Fixture::start().await;
    let mapping = UrlMapping::new(code("abc12345"), "https://example.com/a");

    fixture.repo.insert_one(mapping.clone()).await.unwrap();

    let by_code = fixture.repo.find_by_code(&mapping.code).await.unwrap().unwrap();
    assert_eq!(by_code.original_url, "https://example.com/a");
    assert_eq!(
        by_code.created_at.as_millisecond(),
        mapping.created_at.as_millisecond()
    );

    let by_url = fixture
        .repo
        .find_by_original_url("https://example.com/a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_url.code, mapping.code);
    assert!(fixture.repo.exists(&mapping.code).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn insert_one_conflicts_when_code_maps_elsewhere() {
    let fixture = Fixture::start().await;

    fixture
        .repo
        .insert_one(UrlMapping::new(code("abc12345"), "https://one.example"))
        .await
        .unwrap();

    let err = fixture
        .repo
        .insert_one(UrlMapping::new(code("abc12345"), "https://two.example"))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Conflict(_)));
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn replayed_batch_is_a_no_op() {
    let fixture = Fixture::start().await;
    let batch: Vec<_> = (0..5)
        .map(|i| UrlMapping::new(code(&format!("batch{i:03}")), format!("https://example.com/{i}")))
        .collect();

    fixture.repo.insert_batch(batch.clone()).await.unwrap();
    fixture.repo.insert_batch(batch.clone()).await.unwrap();

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM short_urls")
        .fetch_one(fixture.repo.pool())
        .await
        .unwrap();
    assert_eq!(count, 5);

    for mapping in batch {
        let stored = fixture.repo.find_by_code(&mapping.code).await.unwrap().unwrap();
        assert_eq!(stored.original_url, mapping.original_url);
    }
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn codes_differing_only_in_case_are_distinct() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .insert_one(UrlMapping::new(code("abcd1234"), "https://lower.example"))
        .await
        .unwrap();

    assert!(fixture.repo.find_by_code(&code("ABCD1234")).await.unwrap().is_none());
    assert!(!fixture.repo.exists(&code("ABCD1234")).await.unwrap());

    fixture
        .repo
        .insert_batch(vec![
            UrlMapping::new(code("wxyz5678"), "https://lower.example/2"),
            UrlMapping::new(code("WXYZ5678"), "https://upper.example/2"),
        ])
        .await
        .unwrap();

    let lower = fixture.repo.find_by_code(&code("wxyz5678")).await.unwrap().unwrap();
    let upper = fixture.repo.find_by_code(&code("WXYZ5678")).await.unwrap().unwrap();
    assert_eq!(lower.original_url, "https://lower.example/2");
    assert_eq!(upper.original_url, "https://upper.example/2");
    assert_eq!(upper.code.as_str(), "WXYZ5678");
}
