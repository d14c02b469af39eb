//! Page-side controller for offline caching.
//!
//! Discovers a portfolio's media through the CMS, hands the run to the cache
//! worker, tracks progress for display and records completed portfolios.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use atelier_core::{
    CacheProgress, CacheStatus, MediaUrl, PortfolioCacheRecord, PortfolioData, PortfolioId,
    WorkerCommand, WorkerEvent, dedup_media_urls,
};

use super::OfflineError;
use super::proxy_url::AssetProxy;
use super::worker::{WorkerHandle, WorkerState};
use crate::cms::{CmsClient, Portfolio};
use crate::db::{CacheStorage, RecordRepository};

/// Media discovered for one portfolio.
#[derive(Debug, Clone)]
pub struct CollectedMedia {
    pub urls: Vec<MediaUrl>,
    pub portfolio: Portfolio,
}

/// Every asset URL of every artwork, proxied and deduplicated.
///
/// Order follows the artworks, then each artwork's asset slots.
#[must_use]
pub fn media_urls_for(portfolio: &Portfolio, proxy: &AssetProxy) -> Vec<MediaUrl> {
    dedup_media_urls(
        portfolio
            .artworks
            .iter()
            .flat_map(|artwork| artwork.asset_urls())
            .map(|url| MediaUrl::new(proxy.rewrite(url))),
    )
}

#[derive(Debug, Default)]
struct DisplayState {
    status: String,
    progress: u8,
}

/// Controller for offline caching, shared by request handlers and the CLI.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct OfflineController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    worker: Option<WorkerHandle>,
    cms: CmsClient,
    storage: CacheStorage,
    pool: SqlitePool,
    proxy: AssetProxy,
    display: RwLock<DisplayState>,
}

impl OfflineController {
    /// Create a controller. `worker` is `None` when offline support is unavailable.
    #[must_use]
    pub fn new(
        worker: Option<WorkerHandle>,
        cms: CmsClient,
        storage: CacheStorage,
        pool: SqlitePool,
        proxy: AssetProxy,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                worker,
                cms,
                storage,
                pool,
                proxy,
                display: RwLock::new(DisplayState::default()),
            }),
        }
    }

    /// The registered worker, if any.
    #[must_use]
    pub fn worker(&self) -> Option<&WorkerHandle> {
        self.inner.worker.as_ref()
    }

    /// Load a portfolio and collect its media URLs.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::Cms` if the portfolio cannot be loaded.
    #[instrument(skip(self), fields(portfolio_id = %portfolio_id))]
    pub async fn collect_media_urls(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<CollectedMedia, OfflineError> {
        let portfolio = self.inner.cms.get_portfolio(portfolio_id).await?;
        let urls = media_urls_for(&portfolio, &self.inner.proxy);
        Ok(CollectedMedia { urls, portfolio })
    }

    /// Start caching a portfolio. Returns once the command is posted; the run
    /// reports through worker events.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::NoActiveWorker` if no worker is activated, or
    /// `OfflineError::Cms` if media discovery fails. Neither leaves anything
    /// persisted.
    #[instrument(skip(self), fields(portfolio_id = %portfolio_id))]
    pub async fn start_caching(&self, portfolio_id: &PortfolioId) -> Result<(), OfflineError> {
        let worker = self.active_worker().await?;

        let collected = match self.collect_media_urls(portfolio_id).await {
            Ok(collected) => collected,
            Err(e) => {
                error!(error = %e, "Failed to collect media URLs");
                self.set_status("Failed to load portfolio for offline caching".to_string())
                    .await;
                return Err(e);
            }
        };

        self.post_run(worker, &collected.portfolio, collected.urls)
            .await
    }

    /// Start caching an already loaded portfolio.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::NoActiveWorker` if no worker is activated.
    pub async fn start_caching_portfolio(&self, portfolio: &Portfolio) -> Result<(), OfflineError> {
        let worker = self.active_worker().await?;
        let urls = media_urls_for(portfolio, &self.inner.proxy);
        self.post_run(worker, portfolio, urls).await
    }

    async fn active_worker(&self) -> Result<&WorkerHandle, OfflineError> {
        match self.inner.worker.as_ref() {
            Some(worker) if worker.state() == WorkerState::Activated => Ok(worker),
            _ => {
                self.set_status("Offline caching is not available".to_string())
                    .await;
                Err(OfflineError::NoActiveWorker)
            }
        }
    }

    async fn post_run(
        &self,
        worker: &WorkerHandle,
        portfolio: &Portfolio,
        urls: Vec<MediaUrl>,
    ) -> Result<(), OfflineError> {
        info!(
            portfolio_slug = %portfolio.slug,
            media = urls.len(),
            artworks = portfolio.artworks.len(),
            "Starting offline caching"
        );

        {
            let mut display = self.inner.display.write().await;
            display.status = format!("Caching {}...", portfolio.title);
            display.progress = 0;
        }

        worker
            .post(WorkerCommand::CacheMedia {
                urls,
                portfolio_slug: portfolio.slug.clone(),
                portfolio_data: PortfolioData::from(portfolio),
            })
            .await
    }

    /// Record run progress for display.
    pub async fn on_progress(&self, progress: &CacheProgress) {
        self.inner.display.write().await.progress = progress.progress;
    }

    /// Persist the record of a completed run. Other events are ignored.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::Storage` if the record cannot be saved.
    pub async fn on_complete(&self, event: &WorkerEvent) -> Result<(), OfflineError> {
        let WorkerEvent::CacheComplete {
            portfolio_data,
            media_count,
            total_items_cached,
            total_items,
            ..
        } = event
        else {
            return Ok(());
        };

        let record = PortfolioCacheRecord {
            id: portfolio_data.id.clone(),
            title: portfolio_data.title.clone(),
            slug: portfolio_data.slug.clone(),
            cached_at: Utc::now(),
            media_count: *media_count,
        };
        RecordRepository::new(&self.inner.pool).upsert(&record).await?;

        info!(
            portfolio_id = %record.id,
            cached = total_items_cached,
            total = total_items,
            "Portfolio available offline"
        );

        let mut display = self.inner.display.write().await;
        display.status = format!(
            "{} is available offline ({total_items_cached} of {total_items} items)",
            record.title
        );
        display.progress = 100;
        Ok(())
    }

    /// Delete every named cache and every record.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::Storage` if a deletion fails.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) -> Result<(), OfflineError> {
        let caches = self.inner.storage.delete_all().await?;
        let records = RecordRepository::new(&self.inner.pool).clear().await?;
        info!(caches, records, "Cleared offline cache");

        let mut display = self.inner.display.write().await;
        display.status = "Offline cache cleared".to_string();
        display.progress = 0;
        Ok(())
    }

    /// Persisted records, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::Storage` if the records cannot be read.
    pub async fn records(&self) -> Result<Vec<PortfolioCacheRecord>, OfflineError> {
        Ok(RecordRepository::new(&self.inner.pool).list().await?)
    }

    /// Cache usage, asked of the worker when one is running and read directly
    /// from storage otherwise.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError` if reading the caches fails.
    pub async fn cache_status(&self) -> Result<CacheStatus, OfflineError> {
        match self.inner.worker.as_ref() {
            Some(worker) if worker.state() != WorkerState::Terminated => {
                worker.cache_status().await
            }
            _ => Ok(self.inner.storage.status().await?),
        }
    }

    /// Last status message.
    pub async fn status(&self) -> String {
        self.inner.display.read().await.status.clone()
    }

    /// Last progress value (0-100).
    pub async fn progress(&self) -> u8 {
        self.inner.display.read().await.progress
    }

    async fn set_status(&self, status: String) {
        self.inner.display.write().await.status = status;
    }

    /// Handle one worker event.
    pub async fn dispatch(&self, event: &WorkerEvent) {
        match event {
            WorkerEvent::CacheProgress(progress) => self.on_progress(progress).await,
            WorkerEvent::CacheComplete { .. } => {
                if let Err(e) = self.on_complete(event).await {
                    error!(error = %e, "Failed to record cached portfolio");
                }
            }
            WorkerEvent::CacheRejected {
                portfolio_slug,
                reason,
            } => {
                self.set_status(format!("Could not cache {portfolio_slug}: {reason}"))
                    .await;
            }
        }
    }

    /// Listen to worker events for the lifetime of the worker.
    ///
    /// Returns `None` when no worker is registered.
    #[must_use]
    pub fn spawn_event_listener(&self) -> Option<JoinHandle<()>> {
        let mut events = self.inner.worker.as_ref()?.subscribe();
        let controller = self.clone();

        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => controller.dispatch(&event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event listener lagged behind the cache worker");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}
