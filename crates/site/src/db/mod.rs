//! Embedded sqlite store for the offline cache.
//!
//! # Database: `atelier.db`
//!
//! Stores offline state only (the CMS is source of truth for content):
//!
//! ## Tables
//!
//! - `caches` - Named response caches (page/asset cache, media cache)
//! - `cache_entries` - Stored responses keyed by cache name and absolute URL
//! - `portfolio_cache_records` - Portfolios cached for offline viewing
//!
//! # Migrations
//!
//! Migrations are stored in `crates/site/migrations/` and run via:
//! ```bash
//! cargo run -p atelier-cli -- migrate
//! ```

pub mod cache_storage;
pub mod records;

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;

pub use cache_storage::CacheStorage;
pub use records::RecordRepository;

/// Embedded migrations for the offline store.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,
}

/// Create a sqlite connection pool, creating the database file if missing.
///
/// # Arguments
///
/// * `database_url` - sqlite connection string (e.g. `sqlite://atelier.db`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the URL is invalid or the database cannot be opened.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Create a migrated in-memory pool.
///
/// Every connection to `:memory:` is a separate database, so the pool holds a
/// single connection that is never recycled.
///
/// # Errors
///
/// Returns `sqlx::Error` if the database cannot be opened or migrated.
pub async fn create_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    MIGRATOR.run(&pool).await?;
    Ok(pool)
}
