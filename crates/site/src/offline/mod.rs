//! Offline portfolio cache.
//!
//! # Architecture
//!
//! ```text
//! Controller ──CACHE_MEDIA──▶ Cache worker (actor task) ──▶ bulk run task
//!     ▲                              │                          │
//!     └──── CACHE_PROGRESS / CACHE_COMPLETE (broadcast) ◀───────┘
//!
//! client request ──▶ Interceptor ──▶ named caches (sqlite) / network
//! ```
//!
//! - [`worker`] owns the lifecycle (`Installing → Waiting → Activated → Terminated`)
//!   and the command loop; only one bulk run executes at a time.
//! - [`bulk`] caches a portfolio page, its artwork pages and its media, one item
//!   at a time, reporting progress after every item.
//! - [`intercept`] answers requests from the caches while the worker is active.
//! - [`controller`] discovers media through the CMS, starts runs, and keeps the
//!   durable record of cached portfolios.
//!
//! Cache storage outlives the worker: terminating the worker keeps every entry.

pub mod bulk;
pub mod controller;
pub mod fetch;
pub mod intercept;
pub mod policy;
pub mod proxy_server;
pub mod proxy_url;
pub mod range;
pub mod response;
pub mod worker;

use thiserror::Error;
use url::Url;

pub use controller::OfflineController;
pub use fetch::{FetchError, FetchRequest, Fetcher, HttpFetcher};
pub use intercept::Interceptor;
pub use proxy_url::AssetProxy;
pub use response::StoredResponse;
pub use worker::{OfflineWorker, WorkerConfig, WorkerHandle, WorkerState};

use crate::cms::CmsError;
use crate::db::RepositoryError;

/// Errors from the offline cache.
#[derive(Debug, Error)]
pub enum OfflineError {
    /// Cache or record storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),

    /// Fetching a resource failed.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Media discovery through the CMS failed.
    #[error("CMS error: {0}")]
    Cms(#[from] CmsError),

    /// No cache worker is registered and controlling requests.
    #[error("no active cache worker")]
    NoActiveWorker,

    /// The cache worker stopped before answering.
    #[error("cache worker is not running")]
    WorkerStopped,

    /// A URL could not be resolved against the site origin.
    #[error("invalid URL {0}: {1}")]
    InvalidUrl(String, url::ParseError),
}

/// Names of the two current caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    /// HTML pages and static assets.
    pub pages: String,
    /// Images, video, audio and PDFs.
    pub media: String,
}

impl CacheNames {
    /// Cache names for a version suffix, e.g. `atelier-pages-v1`.
    #[must_use]
    pub fn for_version(version: &str) -> Self {
        Self {
            pages: format!("atelier-pages-{version}"),
            media: format!("atelier-media-{version}"),
        }
    }

    /// Whether `name` is one of the current caches.
    #[must_use]
    pub fn is_current(&self, name: &str) -> bool {
        name == self.pages || name == self.media
    }
}

/// Path of a portfolio's page.
#[must_use]
pub fn portfolio_page_path(portfolio_slug: &str) -> String {
    format!("/portfolios/{portfolio_slug}")
}

/// Path of an artwork's page within its portfolio.
#[must_use]
pub fn artwork_page_path(portfolio_slug: &str, artwork_slug: &str) -> String {
    format!("/portfolios/{portfolio_slug}/{artwork_slug}")
}

/// Resolve a possibly relative URL against the site origin.
///
/// Cache keys are always the absolute form returned here.
///
/// # Errors
///
/// Returns `OfflineError::InvalidUrl` if the URL cannot be parsed.
pub fn resolve_url(origin: &Url, raw: &str) -> Result<Url, OfflineError> {
    origin
        .join(raw)
        .map_err(|e| OfflineError::InvalidUrl(raw.to_string(), e))
}
