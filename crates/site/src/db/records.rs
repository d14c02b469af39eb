//! Portfolio cache record repository.
//!
//! One row per portfolio id. Re-running a caching run replaces the row, and
//! rows are only removed by [`RecordRepository::clear`].

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use atelier_core::{PortfolioCacheRecord, PortfolioId};

use super::RepositoryError;

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    title: String,
    slug: String,
    cached_at: DateTime<Utc>,
    media_count: i64,
}

impl TryFrom<RecordRow> for PortfolioCacheRecord {
    type Error = RepositoryError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let media_count = u32::try_from(row.media_count).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "invalid media_count {} for portfolio {}",
                row.media_count, row.id
            ))
        })?;

        Ok(Self {
            id: PortfolioId::new(row.id),
            title: row.title,
            slug: row.slug,
            cached_at: row.cached_at,
            media_count,
        })
    }
}

/// Repository for cached-portfolio records.
pub struct RecordRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RecordRepository<'a> {
    /// Create a new record repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a record, replacing any record with the same portfolio id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, record), fields(portfolio_id = %record.id))]
    pub async fn upsert(&self, record: &PortfolioCacheRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO portfolio_cache_records (id, title, slug, cached_at, media_count)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                slug = excluded.slug,
                cached_at = excluded.cached_at,
                media_count = excluded.media_count
            ",
        )
        .bind(record.id.as_str())
        .bind(&record.title)
        .bind(&record.slug)
        .bind(record.cached_at)
        .bind(i64::from(record.media_count))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// List all records, most recently cached first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored count is invalid.
    pub async fn list(&self) -> Result<Vec<PortfolioCacheRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r"
            SELECT id, title, slug, cached_at, media_count
            FROM portfolio_cache_records
            ORDER BY cached_at DESC, id
            ",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(PortfolioCacheRecord::try_from).collect()
    }

    /// Get the record for a portfolio.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the portfolio was never cached.
    pub async fn get(&self, id: &PortfolioId) -> Result<PortfolioCacheRecord, RepositoryError> {
        let row = sqlx::query_as::<_, RecordRow>(
            r"
            SELECT id, title, slug, cached_at, media_count
            FROM portfolio_cache_records
            WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        PortfolioCacheRecord::try_from(row)
    }

    /// Delete every record. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM portfolio_cache_records")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
