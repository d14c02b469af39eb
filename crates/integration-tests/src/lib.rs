//! Integration tests for Atelier.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p atelier-integration-tests
//! ```
//!
//! Tests run against an in-memory `SQLite` database and a scripted
//! [`FakeFetcher`] standing in for the network; nothing external is needed.
//!
//! # Test Categories
//!
//! - `offline_worker` - lifecycle, bulk runs, run guard
//! - `interception` - cache rules and byte ranges
//! - `offline_controller` - records and clearing

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use sqlx::SqlitePool;
use tokio::sync::{broadcast, watch};
use url::Url;

use atelier_core::{ArtworkId, ArtworkRef, PortfolioData, PortfolioId, WorkerEvent};
use atelier_site::cms::CmsClient;
use atelier_site::config::CmsConfig;
use atelier_site::db::{CacheStorage, create_memory_pool};
use atelier_site::offline::{
    AssetProxy, CacheNames, FetchError, FetchRequest, Fetcher, OfflineController, StoredResponse,
    WorkerConfig, WorkerHandle,
};

/// Site origin used by every test.
pub const ORIGIN: &str = "https://atelier.test";

/// Asset CDN host used by every test.
pub const CDN_HOST: &str = "media.cdn.test";

/// How long a test waits for a worker event before failing.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

enum Scripted {
    Respond(StoredResponse),
    Fail,
}

/// A [`Fetcher`] answering from a script.
///
/// Unscripted URLs answer 404. Every request is recorded.
pub struct FakeFetcher {
    script: Mutex<HashMap<String, Scripted>>,
    requests: Mutex<Vec<FetchRequest>>,
    offline: AtomicBool,
    gate: watch::Sender<bool>,
}

impl Default for FakeFetcher {
    fn default() -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            gate: watch::Sender::new(true),
        }
    }
}

impl FakeFetcher {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `url` (absolute or origin-relative) with a 200 of the given type and body.
    pub fn ok(&self, url: &str, content_type: &'static str, body: impl Into<Vec<u8>>) {
        let body = body.into();
        let mut response = StoredResponse::new(StatusCode::OK, content_type, body.clone());
        response.headers.insert(
            axum::http::header::CONTENT_LENGTH,
            body.len().to_string().parse().unwrap(),
        );
        self.respond(url, response);
    }

    /// Answer `url` with an arbitrary response.
    pub fn respond(&self, url: &str, response: StoredResponse) {
        self.script
            .lock()
            .unwrap()
            .insert(absolute(url).to_string(), Scripted::Respond(response));
    }

    /// Fail requests for `url` with a network error.
    pub fn fail(&self, url: &str) {
        self.script
            .lock()
            .unwrap()
            .insert(absolute(url).to_string(), Scripted::Fail);
    }

    /// Fail every request with a network error.
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    /// Block every fetch until [`FakeFetcher::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// URLs of every request seen so far.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| r.url.to_string())
            .collect()
    }
}

impl Fetcher for FakeFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse, FetchError> {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        self.requests.lock().unwrap().push(request.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable("offline".to_string()));
        }

        match self.script.lock().unwrap().get(request.url.as_str()) {
            Some(Scripted::Respond(response)) => Ok(response.clone()),
            Some(Scripted::Fail) => Err(FetchError::Unavailable(request.url.to_string())),
            None => Ok(StoredResponse::new(
                StatusCode::NOT_FOUND,
                "text/plain",
                "Not Found",
            )),
        }
    }
}

/// Resolve an origin-relative URL.
#[must_use]
pub fn absolute(url: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(url).unwrap()
}

/// Proxy path for a CDN asset path, e.g. `/v/clip.mp4`.
#[must_use]
pub fn proxied(cdn_path: &str) -> String {
    AssetProxy::proxy_path(&format!("https://{CDN_HOST}{cdn_path}"))
}

/// Worker settings pointing at the test origin, version `v1`.
#[must_use]
pub fn worker_config(precache: &[&str], skip_waiting: bool) -> WorkerConfig {
    WorkerConfig {
        origin: Url::parse(ORIGIN).unwrap(),
        names: CacheNames::for_version("v1"),
        precache: precache.iter().map(ToString::to_string).collect(),
        skip_waiting,
        proxy: AssetProxy::new(CDN_HOST),
    }
}

/// A fresh migrated database and cache storage over it.
pub async fn storage() -> (SqlitePool, CacheStorage) {
    let pool = create_memory_pool().await.unwrap();
    let storage = CacheStorage::new(pool.clone());
    (pool, storage)
}

/// A CMS client pointed at a port nothing listens on.
#[must_use]
pub fn unused_cms() -> CmsClient {
    CmsClient::new(&CmsConfig {
        endpoint: "http://127.0.0.1:9/graphql".to_string(),
        token: None,
    })
}

/// A CMS client for a local GraphQL endpoint answering every query with `data`.
pub async fn stub_cms(data: serde_json::Value) -> CmsClient {
    let body = serde_json::json!({ "data": data });
    let app = Router::new().route(
        "/graphql",
        post(move || {
            let body = body.clone();
            async move { Json(body) }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    CmsClient::new(&CmsConfig {
        endpoint: format!("http://{addr}/graphql"),
        token: None,
    })
}

/// Controller over `pool` with an optional worker and a CMS that is never called.
#[must_use]
pub fn controller(
    pool: &SqlitePool,
    storage: &CacheStorage,
    worker: Option<WorkerHandle>,
) -> OfflineController {
    controller_with_cms(pool, storage, worker, unused_cms())
}

/// Controller over `pool` with an optional worker and the given CMS.
#[must_use]
pub fn controller_with_cms(
    pool: &SqlitePool,
    storage: &CacheStorage,
    worker: Option<WorkerHandle>,
    cms: CmsClient,
) -> OfflineController {
    OfflineController::new(
        worker,
        cms,
        storage.clone(),
        pool.clone(),
        AssetProxy::new(CDN_HOST),
    )
}

/// Portfolio metadata with one artwork per slug.
#[must_use]
pub fn portfolio_data(slug: &str, artwork_slugs: &[&str]) -> PortfolioData {
    PortfolioData {
        id: PortfolioId::new(format!("id-{slug}")),
        title: slug.to_uppercase(),
        slug: slug.to_string(),
        artworks: artwork_slugs
            .iter()
            .map(|a| ArtworkRef {
                id: ArtworkId::new(format!("id-{a}")),
                title: a.to_string(),
                slug: a.to_string(),
            })
            .collect(),
    }
}

/// Receive events until one matches, failing after [`EVENT_TIMEOUT`].
pub async fn next_matching(
    events: &mut broadcast::Receiver<WorkerEvent>,
    mut matches: impl FnMut(&WorkerEvent) -> bool,
) -> WorkerEvent {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            let event = events.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

/// Receive every event up to and including `CACHE_COMPLETE`.
pub async fn collect_run(events: &mut broadcast::Receiver<WorkerEvent>) -> Vec<WorkerEvent> {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.unwrap();
            let done = matches!(event, WorkerEvent::CacheComplete { .. });
            seen.push(event);
            if done {
                return seen;
            }
        }
    })
    .await
    .unwrap()
}
