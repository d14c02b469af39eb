//! Durable record of a completed offline caching run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::PortfolioId;

/// A portfolio that has been cached for offline viewing.
///
/// One record exists per portfolio id; a re-run replaces the previous record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioCacheRecord {
    pub id: PortfolioId,
    pub title: String,
    pub slug: String,
    pub cached_at: DateTime<Utc>,
    /// Number of media files stored by the run.
    pub media_count: u32,
}
