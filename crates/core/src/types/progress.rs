//! Progress reporting for bulk caching runs.

use serde::{Deserialize, Serialize};

/// Phase of a bulk caching run. Phases always run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStage {
    PortfolioPage,
    ArtworkPages,
    MediaFiles,
}

impl CacheStage {
    /// Wire name of the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PortfolioPage => "portfolio_page",
            Self::ArtworkPages => "artwork_pages",
            Self::MediaFiles => "media_files",
        }
    }
}

impl std::fmt::Display for CacheStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress after one item of a bulk caching run has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheProgress {
    /// Percentage complete, 0-100.
    pub progress: u8,
    /// Items processed so far, across all stages.
    pub current: u32,
    /// Total items in the run (1 portfolio page + artwork pages + media files).
    pub total: u32,
    pub stage: CacheStage,
}

impl CacheProgress {
    /// Build a progress event, rounding the percentage to the nearest integer.
    #[must_use]
    pub fn new(current: u32, total: u32, stage: CacheStage) -> Self {
        Self {
            progress: percent(current, total),
            current,
            total,
            stage,
        }
    }
}

fn percent(current: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    let current = u64::from(current.min(total));
    let total = u64::from(total);
    let rounded = (current * 100 + total / 2) / total;
    u8::try_from(rounded).unwrap_or(100)
}
