//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! atelier migrate
//! ```
//!
//! # Environment Variables
//!
//! - `ATELIER_DATABASE_URL` - `SQLite` connection string (default `sqlite://atelier.db`)
//!
//! # Migration Files
//!
//! Migrations live in `crates/site/migrations/` and are embedded at build time:
//! ```
//! migrations/
//! ├── 20260301000000_offline_cache.sql
//! └── 20260301000100_portfolio_cache_records.sql
//! ```

use atelier_site::db;

use super::CommandError;

const DEFAULT_DATABASE_URL: &str = "sqlite://atelier.db";

/// Run the site database migrations.
pub async fn run() -> Result<(), CommandError> {
    dotenvy::dotenv().ok();

    // Only the database URL is needed here, not the full site configuration.
    let database_url = std::env::var("ATELIER_DATABASE_URL")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Running migrations...");
    db::MIGRATOR.run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
