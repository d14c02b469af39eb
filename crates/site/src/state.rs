//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::cms::CmsClient;
use crate::config::SiteConfig;
use crate::db::CacheStorage;
use crate::offline::{AssetProxy, OfflineController, WorkerHandle};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: SiteConfig,
    pool: SqlitePool,
    cms: CmsClient,
    storage: CacheStorage,
    controller: OfflineController,
    proxy: AssetProxy,
    http: reqwest::Client,
}

impl AppState {
    /// Create a new application state.
    ///
    /// `worker` is the running cache worker, or `None` to serve without
    /// offline support.
    #[must_use]
    pub fn new(config: SiteConfig, pool: SqlitePool, worker: Option<WorkerHandle>) -> Self {
        let cms = CmsClient::new(&config.cms);
        let storage = CacheStorage::new(pool.clone());
        let proxy = AssetProxy::new(config.offline.cdn_host.clone());
        let controller = OfflineController::new(
            worker,
            cms.clone(),
            storage.clone(),
            pool.clone(),
            proxy.clone(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                cms,
                storage,
                controller,
                proxy,
                http: reqwest::Client::new(),
            }),
        }
    }

    /// Get a reference to the site configuration.
    #[must_use]
    pub fn config(&self) -> &SiteConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Get a reference to the CMS client.
    #[must_use]
    pub fn cms(&self) -> &CmsClient {
        &self.inner.cms
    }

    /// Get a reference to the named cache storage.
    #[must_use]
    pub fn storage(&self) -> &CacheStorage {
        &self.inner.storage
    }

    /// Get a reference to the offline cache controller.
    #[must_use]
    pub fn controller(&self) -> &OfflineController {
        &self.inner.controller
    }

    /// Get a reference to the CDN asset proxy rules.
    #[must_use]
    pub fn proxy(&self) -> &AssetProxy {
        &self.inner.proxy
    }

    /// Get a reference to the HTTP client used for proxied assets.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }
}
