//! Request interception against the named caches.
//!
//! While the worker is activated, every GET request goes through three rules;
//! the first that matches answers it:
//!
//! 1. **CDN assets**: video containers get compression parameters, the URL is
//!    rewritten to the proxy, and the media cache answers (compressed key
//!    first, then the plain key). A miss is fetched live and not stored.
//! 2. **Audio and video**: served from the media cache with byte-range
//!    support. A miss is fetched in full, stored when it is a 200, then
//!    answered (sliced when a range was asked for).
//! 3. **Everything else**: any cache, then the network. Successful static
//!    assets, stylesheets and scripts are stored in the page cache. When the
//!    network fails, stylesheets and scripts get an empty valid body and
//!    anything else gets 503.
//!
//! Non-GET requests, and every request while the worker is not activated, go
//! straight to the network.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use super::fetch::{FetchRequest, Fetcher};
use super::policy::{
    CompressionPolicy, UserAgentCompression, compressed_url, has_media_extension,
    is_media_destination, is_static_asset, is_style_or_script,
};
use super::proxy_url::AssetProxy;
use super::range::partial_response;
use super::response::StoredResponse;
use super::worker::{WorkerConfig, WorkerHandle, WorkerState};
use super::{OfflineError, resolve_url};
use crate::db::CacheStorage;

/// Body of synthesized stylesheets and scripts.
pub const OFFLINE_ASSET_BODY: &str = "/* offline */";

/// Answers requests from the named caches on behalf of the cache worker.
pub struct Interceptor<F> {
    config: Arc<WorkerConfig>,
    storage: CacheStorage,
    fetcher: Arc<F>,
    state: watch::Receiver<WorkerState>,
    policy: Arc<dyn CompressionPolicy>,
}

impl<F> Clone for Interceptor<F> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            storage: self.storage.clone(),
            fetcher: Arc::clone(&self.fetcher),
            state: self.state.clone(),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<F: Fetcher> Interceptor<F> {
    /// Create an interceptor controlled by `worker`, using the default
    /// user-agent compression policy.
    #[must_use]
    pub fn new(worker: &WorkerHandle, storage: CacheStorage, fetcher: Arc<F>) -> Self {
        Self {
            config: Arc::clone(worker.config()),
            storage,
            fetcher,
            state: worker.state_watch(),
            policy: Arc::new(UserAgentCompression),
        }
    }

    /// Replace the compression policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn CompressionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Origin relative URLs are resolved against.
    #[must_use]
    pub fn origin(&self) -> &Url {
        &self.config.origin
    }

    /// The asset CDN this interceptor rewrites.
    #[must_use]
    pub fn proxy(&self) -> &AssetProxy {
        &self.config.proxy
    }

    /// Whether requests are currently answered from the caches.
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.state.borrow() == WorkerState::Activated
    }

    /// Answer a request.
    pub async fn handle(&self, request: FetchRequest) -> StoredResponse {
        if request.method != Method::GET || !self.is_active() {
            return self.passthrough(&request).await;
        }

        if self.config.proxy.is_cdn(&request.url) {
            return self.handle_cdn(&request).await;
        }

        if self.is_media_request(&request) {
            return self.handle_media(&request).await;
        }

        self.handle_default(&request).await
    }

    async fn passthrough(&self, request: &FetchRequest) -> StoredResponse {
        match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network request failed");
                StoredResponse::new(StatusCode::BAD_GATEWAY, "text/plain", "Bad Gateway")
            }
        }
    }

    fn is_media_request(&self, request: &FetchRequest) -> bool {
        is_media_destination(request.destination())
            || has_media_extension(&request.url)
            || AssetProxy::inner_url(&request.url).is_some_and(|inner| has_media_extension(&inner))
    }

    /// Rule 1: CDN assets through the proxy.
    async fn handle_cdn(&self, request: &FetchRequest) -> StoredResponse {
        let target = compressed_url(&request.url, self.policy.as_ref(), request.user_agent())
            .unwrap_or_else(|| request.url.clone());

        let (Ok(compressed_key), Ok(plain_key)) = (
            self.proxy_key(&target),
            self.proxy_key(&request.url),
        ) else {
            return offline_response();
        };

        let cached = match self.lookup_media(compressed_key.as_str()).await {
            Some(hit) => Some(hit),
            None if plain_key != compressed_key => self.lookup_media(plain_key.as_str()).await,
            None => None,
        };
        if let Some(hit) = cached {
            debug!(url = %request.url, "Serving CDN asset from media cache");
            return with_range(hit, request);
        }

        match self.fetcher.fetch(&request.with_url(compressed_key)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Failed to fetch CDN asset");
                offline_response()
            }
        }
    }

    /// Rule 2: audio and video with byte ranges.
    async fn handle_media(&self, request: &FetchRequest) -> StoredResponse {
        if let Some(hit) = self.lookup_media(request.url.as_str()).await {
            debug!(url = %request.url, "Serving media from cache");
            return with_range(hit, request);
        }

        let response = match self.fetcher.fetch(&request.without_range()).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Failed to fetch media");
                return offline_response();
            }
        };

        if response.is_cacheable() {
            if let Err(e) = self
                .storage
                .put(&self.config.names.media, request.url.as_str(), &response)
                .await
            {
                warn!(url = %request.url, error = %e, "Failed to store media");
            }
            return with_range(response, request);
        }
        response
    }

    /// Rule 3: pages and everything else.
    async fn handle_default(&self, request: &FetchRequest) -> StoredResponse {
        match self.storage.match_any(request.url.as_str()).await {
            Ok(Some(hit)) => return hit,
            Ok(None) => {}
            Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed"),
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() && is_static_asset(&request.url) {
                    if let Err(e) = self
                        .storage
                        .put(&self.config.names.pages, request.url.as_str(), &response)
                        .await
                    {
                        warn!(url = %request.url, error = %e, "Failed to store static asset");
                    }
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Offline and not cached");
                offline_fallback(&request.url)
            }
        }
    }

    fn proxy_key(&self, url: &Url) -> Result<Url, OfflineError> {
        resolve_url(&self.config.origin, &AssetProxy::proxy_path(url.as_str()))
    }

    async fn lookup_media(&self, key: &str) -> Option<StoredResponse> {
        match self.storage.match_in(&self.config.names.media, key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(url = %key, error = %e, "Media cache lookup failed");
                None
            }
        }
    }
}

fn with_range(response: StoredResponse, request: &FetchRequest) -> StoredResponse {
    match request.range() {
        Some(range) if response.is_cacheable() => partial_response(response, range),
        _ => response,
    }
}

fn offline_response() -> StoredResponse {
    StoredResponse::new(StatusCode::SERVICE_UNAVAILABLE, "text/plain", "Offline")
}

/// Empty stylesheets and scripts keep pages rendering while offline.
fn offline_fallback(url: &Url) -> StoredResponse {
    if !is_style_or_script(url) {
        return offline_response();
    }
    let content_type = if url.path().ends_with(".css") {
        "text/css"
    } else {
        "application/javascript"
    };
    StoredResponse::new(StatusCode::OK, content_type, OFFLINE_ASSET_BODY)
}
