//! Bulk caching of one portfolio.
//!
//! A run has three phases, each strictly sequential:
//!
//! 1. the portfolio page,
//! 2. every artwork page,
//! 3. every media URL.
//!
//! Progress is broadcast after every item with a total of `1 + N + M` (N
//! artworks, M media URLs). A failed item is logged and skipped; nothing a run
//! stored is rolled back.

use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use atelier_core::{CacheProgress, CacheStage, MediaUrl, PortfolioData, WorkerEvent};

use super::fetch::{FetchError, FetchRequest, Fetcher};
use super::worker::WorkerConfig;
use super::{OfflineError, artwork_page_path, portfolio_page_path, resolve_url};
use crate::db::CacheStorage;

/// Counts collected over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub portfolio_page_cached: bool,
    pub artwork_pages_cached: u32,
    pub media_cached: u32,
    pub total_items: u32,
}

impl RunSummary {
    /// Items stored across all three phases.
    #[must_use]
    pub fn total_items_cached(&self) -> u32 {
        u32::from(self.portfolio_page_cached) + self.artwork_pages_cached + self.media_cached
    }

    /// The `CACHE_COMPLETE` event for this run.
    #[must_use]
    pub fn completion_event(&self, media_total: u32, portfolio_data: PortfolioData) -> WorkerEvent {
        WorkerEvent::CacheComplete {
            cached: self.media_cached,
            total: media_total,
            portfolio_data,
            media_count: self.media_cached,
            total_items_cached: self.total_items_cached(),
            total_items: self.total_items,
            artwork_pages_cached: self.artwork_pages_cached,
        }
    }
}

/// One bulk caching run.
pub struct BulkCacheRun<'a, F> {
    config: &'a WorkerConfig,
    storage: &'a CacheStorage,
    fetcher: &'a F,
    events: &'a broadcast::Sender<WorkerEvent>,
}

impl<'a, F: Fetcher> BulkCacheRun<'a, F> {
    #[must_use]
    pub const fn new(
        config: &'a WorkerConfig,
        storage: &'a CacheStorage,
        fetcher: &'a F,
        events: &'a broadcast::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            events,
        }
    }

    /// Cache the portfolio page, its artwork pages and `urls`, then broadcast
    /// `CACHE_COMPLETE`.
    #[instrument(skip_all, fields(portfolio_slug = %portfolio_slug, media = urls.len()))]
    pub async fn run(
        &self,
        urls: &[MediaUrl],
        portfolio_slug: &str,
        portfolio_data: PortfolioData,
    ) -> RunSummary {
        let artworks = portfolio_data.artworks.len();
        let total = saturating_u32(1 + artworks + urls.len());
        let mut summary = RunSummary {
            total_items: total,
            ..RunSummary::default()
        };
        let mut current = 0u32;

        let page = portfolio_page_path(portfolio_slug);
        summary.portfolio_page_cached = self.cache_item(&self.config.names.pages, &page).await;
        current += 1;
        self.progress(current, total, CacheStage::PortfolioPage);

        for artwork in &portfolio_data.artworks {
            let page = artwork_page_path(portfolio_slug, &artwork.slug);
            if self.cache_item(&self.config.names.pages, &page).await {
                summary.artwork_pages_cached += 1;
            }
            current += 1;
            self.progress(current, total, CacheStage::ArtworkPages);
        }

        for url in urls {
            if self.cache_item(&self.config.names.media, url.as_str()).await {
                summary.media_cached += 1;
            }
            current += 1;
            self.progress(current, total, CacheStage::MediaFiles);
        }

        info!(
            cached = summary.total_items_cached(),
            total = summary.total_items,
            media_cached = summary.media_cached,
            "Portfolio caching finished"
        );

        let _ = self.events.send(
            summary.completion_event(saturating_u32(urls.len()), portfolio_data),
        );
        summary
    }

    /// Fetch one item and store it. Failures are logged and reported as `false`.
    async fn cache_item(&self, cache_name: &str, raw_url: &str) -> bool {
        match self.try_cache_item(cache_name, raw_url).await {
            Ok(()) => true,
            Err(e) => {
                warn!(url = %raw_url, cache = %cache_name, error = %e, "Failed to cache item");
                false
            }
        }
    }

    async fn try_cache_item(&self, cache_name: &str, raw_url: &str) -> Result<(), OfflineError> {
        let url = resolve_url(&self.config.origin, raw_url)?;
        let response = self.fetcher.fetch(&FetchRequest::get(url.clone())).await?;

        if !response.is_cacheable() {
            return Err(FetchError::Status {
                status: response.status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        self.storage.put(cache_name, url.as_str(), &response).await?;
        Ok(())
    }

    fn progress(&self, current: u32, total: u32, stage: CacheStage) {
        // No receivers is fine: progress is best-effort.
        let _ = self
            .events
            .send(WorkerEvent::CacheProgress(CacheProgress::new(current, total, stage)));
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use atelier_core::PortfolioId;

    #[test]
    fn test_completion_event_counts() {
        let summary = RunSummary {
            portfolio_page_cached: true,
            artwork_pages_cached: 2,
            media_cached: 3,
            total_items: 7,
        };
        assert_eq!(summary.total_items_cached(), 6);

        let data = PortfolioData {
            id: PortfolioId::new("p1"),
            title: "Salt".to_string(),
            slug: "salt".to_string(),
            artworks: Vec::new(),
        };
        let WorkerEvent::CacheComplete {
            cached,
            total,
            media_count,
            total_items_cached,
            total_items,
            artwork_pages_cached,
            ..
        } = summary.completion_event(4, data)
        else {
            panic!("expected CACHE_COMPLETE");
        };

        assert_eq!((cached, total, media_count), (3, 4, 3));
        assert_eq!((total_items_cached, total_items), (6, 7));
        assert_eq!(artwork_pages_cached, 2);
    }
}
