use async_trait::async_trait;
use burrow_core::repository::{ReadRepository, Repository, Result};
use burrow_core::{ShortCode, StorageError, UrlMapping};
use jiff::Timestamp;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use tracing::debug;

/// DDL for the `short_urls` table.
pub const SCHEMA: &str = include_str!("../ddl/mysql/short_urls.sql");

/// Upper bound on rows sent in one multi-row `INSERT`.
const MAX_ROWS_PER_STATEMENT: usize = 500;

/// MySQL implementation of the repository contract.
///
/// `short_code` carries a unique key; `original_url` is indexed but not
/// unique. Timestamps are stored as unix milliseconds.
#[derive(Debug, Clone)]
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    /// Creates a repository from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Creates the `short_urls` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn mapping_from_row(row: &MySqlRow) -> Result<UrlMapping> {
    let code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
    let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;

    let code = ShortCode::new(code)
        .map_err(|e| StorageError::InvalidData(format!("stored short code is invalid: {e}")))?;
    let created_at = Timestamp::from_millisecond(created_at).map_err(|e| {
        StorageError::InvalidData(format!("invalid created_at timestamp '{created_at}': {e}"))
    })?;

    Ok(UrlMapping {
        code,
        original_url,
        created_at,
    })
}

#[async_trait]
impl ReadRepository for MySqlRepository {
    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlMapping>> {
        let row = sqlx::query(
            r#"
            SELECT short_code, original_url, created_at
            FROM short_urls
            WHERE short_code = ?
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(mapping_from_row).transpose()
    }

    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<UrlMapping>> {
        let row = sqlx::query(
            r#"
            SELECT short_code, original_url, created_at
            FROM short_urls
            WHERE original_url = ?
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(mapping_from_row).transpose()
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        let exists = sqlx::query(
            r#"
            SELECT 1
            FROM short_urls
            WHERE short_code = ?
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .is_some();

        Ok(exists)
    }
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn insert_one(&self, mapping: UrlMapping) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO short_urls (short_code, original_url, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(mapping.code.as_str())
        .bind(&mapping.original_url)
        .bind(mapping.created_at.as_millisecond())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                match self.find_by_code(&mapping.code).await? {
                    Some(stored) if stored.original_url == mapping.original_url => Ok(()),
                    _ => Err(StorageError::Conflict(mapping.code.to_string())),
                }
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn insert_batch(&self, mappings: Vec<UrlMapping>) -> Result<()> {
        if mappings.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for chunk in mappings.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<'_, MySql> =
                QueryBuilder::new("INSERT INTO short_urls (short_code, original_url, created_at) ");
            builder.push_values(chunk, |mut row, mapping| {
                row.push_bind(mapping.code.as_str())
                    .push_bind(mapping.original_url.as_str())
                    .push_bind(mapping.created_at.as_millisecond());
            });
            // Rows whose code already exists are left untouched.
            builder.push(" ON DUPLICATE KEY UPDATE short_code = short_code");

            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(rows = mappings.len(), "committed mapping batch");
        Ok(())
    }
}
