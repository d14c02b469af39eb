//! CLI subcommands.

pub mod content;
pub mod migrate;
pub mod offline;
pub mod proxy;

use sqlx::SqlitePool;
use thiserror::Error;

use atelier_site::cms::CmsError;
use atelier_site::config::{ConfigError, SiteConfig};
use atelier_site::db::{self, RepositoryError};
use atelier_site::offline::OfflineError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Cache or record storage failed.
    #[error("Storage error: {0}")]
    Repository(#[from] RepositoryError),

    /// CMS request failed.
    #[error("CMS error: {0}")]
    Cms(#[from] CmsError),

    /// Offline cache operation failed.
    #[error("Offline cache error: {0}")]
    Offline(#[from] OfflineError),

    /// The cache worker refused the run.
    #[error("Caching rejected: {0}")]
    Rejected(String),

    /// Terminal or socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load the site configuration and open the database.
async fn connect() -> Result<(SiteConfig, SqlitePool), CommandError> {
    let config = SiteConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;
    Ok((config, pool))
}
