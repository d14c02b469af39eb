//! Message protocol between the offline cache controller and the cache worker.
//!
//! Messages are `type`-tagged JSON objects with camelCase fields, e.g.
//!
//! ```json
//! {"type": "CACHE_MEDIA", "urls": ["/api/proxy?url=..."], "portfolioSlug": "tides", "portfolioData": {...}}
//! {"type": "CACHE_PROGRESS", "progress": 40, "current": 4, "total": 10, "stage": "media_files"}
//! ```

use serde::{Deserialize, Serialize};

use super::id::{ArtworkId, PortfolioId};
use super::media::MediaUrl;
use super::progress::CacheProgress;

/// Portfolio metadata carried through a caching run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioData {
    pub id: PortfolioId,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub artworks: Vec<ArtworkRef>,
}

/// The part of an artwork needed to cache its page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkRef {
    pub id: ArtworkId,
    pub title: String,
    pub slug: String,
}

/// Commands sent from the controller to the cache worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum WorkerCommand {
    /// Cache a portfolio page, its artwork pages and the given media URLs.
    CacheMedia {
        urls: Vec<MediaUrl>,
        portfolio_slug: String,
        portfolio_data: PortfolioData,
    },
    /// Report cache usage over the reply channel.
    GetCacheStatus,
}

/// Events broadcast by the cache worker to every listening client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum WorkerEvent {
    CacheProgress(CacheProgress),
    CacheComplete {
        /// Media files stored.
        cached: u32,
        /// Media files requested.
        total: u32,
        portfolio_data: PortfolioData,
        media_count: u32,
        total_items_cached: u32,
        total_items: u32,
        artwork_pages_cached: u32,
    },
    /// A caching command was refused because another run is in flight.
    CacheRejected {
        portfolio_slug: String,
        reason: String,
    },
}

/// Aggregate usage of all named caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub file_count: u64,
    /// Sum of `content-length` headers; entries without one count as zero.
    pub total_size: u64,
    pub formatted_size: String,
}

impl CacheStatus {
    /// Build a status with a human-readable size.
    #[must_use]
    pub fn new(file_count: u64, total_size: u64) -> Self {
        Self {
            file_count,
            total_size,
            formatted_size: crate::format::format_bytes(total_size),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::progress::CacheStage;

    fn portfolio() -> PortfolioData {
        PortfolioData {
            id: PortfolioId::new("p1"),
            title: "Salt".to_string(),
            slug: "salt".to_string(),
            artworks: vec![ArtworkRef {
                id: ArtworkId::new("a1"),
                title: "Brine I".to_string(),
                slug: "brine-i".to_string(),
            }],
        }
    }

    #[test]
    fn test_cache_media_wire_shape() {
        let command = WorkerCommand::CacheMedia {
            urls: vec![MediaUrl::new("/api/proxy?url=x")],
            portfolio_slug: "salt".to_string(),
            portfolio_data: portfolio(),
        };

        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["type"], "CACHE_MEDIA");
        assert_eq!(json["portfolioSlug"], "salt");
        assert_eq!(json["urls"][0], "/api/proxy?url=x");
        assert_eq!(json["portfolioData"]["artworks"][0]["slug"], "brine-i");
    }

    #[test]
    fn test_get_cache_status_parses() {
        let command: WorkerCommand =
            serde_json::from_str(r#"{"type":"GET_CACHE_STATUS"}"#).unwrap();
        assert_eq!(command, WorkerCommand::GetCacheStatus);
    }

    #[test]
    fn test_progress_event_is_flat() {
        let event = WorkerEvent::CacheProgress(CacheProgress::new(4, 10, CacheStage::MediaFiles));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CACHE_PROGRESS");
        assert_eq!(json["progress"], 40);
        assert_eq!(json["current"], 4);
        assert_eq!(json["stage"], "media_files");
    }

    #[test]
    fn test_complete_event_field_names() {
        let event = WorkerEvent::CacheComplete {
            cached: 3,
            total: 4,
            portfolio_data: portfolio(),
            media_count: 3,
            total_items_cached: 5,
            total_items: 6,
            artwork_pages_cached: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CACHE_COMPLETE");
        assert_eq!(json["totalItemsCached"], 5);
        assert_eq!(json["artworkPagesCached"], 1);
        assert_eq!(json["portfolioData"]["slug"], "salt");
    }

    #[test]
    fn test_cache_status_formats_size() {
        let status = CacheStatus::new(2, 1536);
        assert_eq!(status.formatted_size, "1.50 KB");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["fileCount"], 2);
        assert_eq!(json["totalSize"], 1536);
    }
}
