//! Integration tests for request interception against the named caches.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use tower::ServiceExt;

use atelier_integration_tests::{
    CDN_HOST, FakeFetcher, absolute, proxied, storage, worker_config,
};
use atelier_site::db::CacheStorage;
use atelier_site::offline::intercept::OFFLINE_ASSET_BODY;
use atelier_site::offline::policy::{CompressionPolicy, UserAgentCompression, compressed_url};
use atelier_site::offline::proxy_server::proxy_router;
use atelier_site::offline::{
    AssetProxy, FetchRequest, Interceptor, OfflineWorker, StoredResponse, WorkerHandle,
    WorkerState,
};

const MEDIA: &str = "atelier-media-v1";
const PAGES: &str = "atelier-pages-v1";
const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0";

async fn active(
    fetcher: &Arc<FakeFetcher>,
) -> (CacheStorage, WorkerHandle, Interceptor<FakeFetcher>) {
    let (_pool, storage) = storage().await;
    let worker = OfflineWorker::spawn(
        worker_config(&[], true),
        storage.clone(),
        Arc::clone(fetcher),
    );
    worker.wait_for(WorkerState::Activated).await.unwrap();
    let interceptor = Interceptor::new(&worker, storage.clone(), Arc::clone(fetcher));
    (storage, worker, interceptor)
}

fn hundred_bytes(content_type: &'static str) -> StoredResponse {
    let body: Vec<u8> = (0..100).collect();
    let mut response = StoredResponse::new(StatusCode::OK, content_type, body);
    response
        .headers
        .insert(header::CONTENT_LENGTH, "100".parse().unwrap());
    response
}

fn get(url: &str) -> FetchRequest {
    FetchRequest::get(absolute(url))
}

fn header_value<'a>(response: &'a StoredResponse, name: header::HeaderName) -> Option<&'a str> {
    response.headers.get(name).and_then(|v| v.to_str().ok())
}

// ============================================================================
// Audio and video
// ============================================================================

#[tokio::test]
async fn test_cached_media_serves_closed_range() {
    let fetcher = FakeFetcher::new();
    let (storage, _worker, interceptor) = active(&fetcher).await;
    let url = absolute(&proxied("/v/clip.mp4"));
    storage
        .put(MEDIA, url.as_str(), &hundred_bytes("video/mp4"))
        .await
        .unwrap();

    let response = interceptor
        .handle(FetchRequest::get(url).with_header(header::RANGE, "bytes=10-19"))
        .await;

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.body.as_ref(), (10u8..20).collect::<Vec<_>>());
    assert_eq!(
        header_value(&response, header::CONTENT_RANGE),
        Some("bytes 10-19/100")
    );
    assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("10"));
    assert_eq!(header_value(&response, header::ACCEPT_RANGES), Some("bytes"));
    assert_eq!(response.content_type(), Some("video/mp4"));
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_cached_media_serves_open_ended_range() {
    let fetcher = FakeFetcher::new();
    let (storage, _worker, interceptor) = active(&fetcher).await;
    let url = absolute(&proxied("/v/clip.mp4"));
    storage
        .put(MEDIA, url.as_str(), &hundred_bytes("video/mp4"))
        .await
        .unwrap();

    let response = interceptor
        .handle(FetchRequest::get(url).with_header(header::RANGE, "bytes=50-"))
        .await;

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.body.len(), 50);
    assert_eq!(
        header_value(&response, header::CONTENT_RANGE),
        Some("bytes 50-99/100")
    );
}

#[tokio::test]
async fn test_cached_media_without_range_is_served_whole() {
    let fetcher = FakeFetcher::new();
    let (storage, _worker, interceptor) = active(&fetcher).await;
    let url = absolute("/media/song.mp3");
    storage
        .put(MEDIA, url.as_str(), &hundred_bytes("audio/mpeg"))
        .await
        .unwrap();

    let response = interceptor.handle(FetchRequest::get(url)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.len(), 100);
}

#[tokio::test]
async fn test_media_miss_is_fetched_whole_and_stored() {
    let fetcher = FakeFetcher::new();
    fetcher.respond("/media/song.mp3", hundred_bytes("audio/mpeg"));
    let (storage, _worker, interceptor) = active(&fetcher).await;

    let response = interceptor
        .handle(get("/media/song.mp3").with_header(header::RANGE, "bytes=0-9"))
        .await;

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.body.len(), 10);

    let requests = fetcher.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].range().is_none());

    let stored = storage
        .match_in(MEDIA, absolute("/media/song.mp3").as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.body.len(), 100);
}

#[tokio::test]
async fn test_media_destination_without_extension_uses_media_cache() {
    let fetcher = FakeFetcher::new();
    let (storage, _worker, interceptor) = active(&fetcher).await;
    let url = absolute("/stream/42");
    storage
        .put(MEDIA, url.as_str(), &hundred_bytes("video/webm"))
        .await
        .unwrap();

    let response = interceptor
        .handle(
            FetchRequest::get(url)
                .with_header(header::HeaderName::from_static("sec-fetch-dest"), "video")
                .with_header(header::RANGE, "bytes=90-"),
        )
        .await;

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.body.len(), 10);
}

#[tokio::test]
async fn test_unsatisfiable_range_on_cached_media() {
    let fetcher = FakeFetcher::new();
    let (storage, _worker, interceptor) = active(&fetcher).await;
    let url = absolute(&proxied("/v/clip.mp4"));
    storage
        .put(MEDIA, url.as_str(), &hundred_bytes("video/mp4"))
        .await
        .unwrap();

    let response = interceptor
        .handle(FetchRequest::get(url).with_header(header::RANGE, "bytes=200-300"))
        .await;

    assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        header_value(&response, header::CONTENT_RANGE),
        Some("bytes */100")
    );
}

// ============================================================================
// CDN assets
// ============================================================================

fn cdn_request(path: &str) -> FetchRequest {
    FetchRequest::get(url::Url::parse(&format!("https://{CDN_HOST}{path}")).unwrap())
        .with_header(header::USER_AGENT, DESKTOP_UA)
}

fn compressed_key(path: &str) -> String {
    let original = url::Url::parse(&format!("https://{CDN_HOST}{path}")).unwrap();
    let compressed = compressed_url(&original, &UserAgentCompression, Some(DESKTOP_UA)).unwrap();
    absolute(&AssetProxy::proxy_path(compressed.as_str())).to_string()
}

#[tokio::test]
async fn test_cdn_video_prefers_compressed_key() {
    let fetcher = FakeFetcher::new();
    let (storage, _worker, interceptor) = active(&fetcher).await;
    let plain = absolute(&proxied("/v/clip.mp4")).to_string();
    let compressed = compressed_key("/v/clip.mp4");
    assert_ne!(plain, compressed);

    storage
        .put(MEDIA, &plain, &StoredResponse::new(StatusCode::OK, "video/mp4", "plain"))
        .await
        .unwrap();
    storage
        .put(
            MEDIA,
            &compressed,
            &StoredResponse::new(StatusCode::OK, "video/mp4", "compressed"),
        )
        .await
        .unwrap();

    let response = interceptor.handle(cdn_request("/v/clip.mp4")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_ref(), b"compressed");
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_cdn_video_falls_back_to_plain_key() {
    let fetcher = FakeFetcher::new();
    let (storage, _worker, interceptor) = active(&fetcher).await;
    let plain = absolute(&proxied("/v/clip.mp4")).to_string();
    storage
        .put(MEDIA, &plain, &hundred_bytes("video/mp4"))
        .await
        .unwrap();

    let response = interceptor
        .handle(cdn_request("/v/clip.mp4").with_header(header::RANGE, "bytes=0-49"))
        .await;

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.body.len(), 50);
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_cdn_miss_is_fetched_through_proxy_and_not_stored() {
    let fetcher = FakeFetcher::new();
    let compressed = compressed_key("/v/new.mp4");
    fetcher.ok(&compressed, "video/mp4", "live");
    let (storage, _worker, interceptor) = active(&fetcher).await;

    let response = interceptor.handle(cdn_request("/v/new.mp4")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_ref(), b"live");
    assert_eq!(fetcher.requested_urls(), vec![compressed]);
    assert!(storage.keys(MEDIA).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cdn_image_is_not_compressed() {
    let fetcher = FakeFetcher::new();
    let (storage, _worker, interceptor) = active(&fetcher).await;
    let plain = absolute(&proxied("/i/still.jpg")).to_string();
    storage
        .put(MEDIA, &plain, &StoredResponse::new(StatusCode::OK, "image/jpeg", "jpeg"))
        .await
        .unwrap();

    let response = interceptor.handle(cdn_request("/i/still.jpg")).await;

    assert_eq!(response.body.as_ref(), b"jpeg");
}

#[tokio::test]
async fn test_cdn_miss_while_offline_is_503() {
    let fetcher = FakeFetcher::new();
    fetcher.go_offline();
    let (_storage, _worker, interceptor) = active(&fetcher).await;

    let response = interceptor.handle(cdn_request("/v/gone.mp4")).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

/// Always asks for the smallest rendition.
struct Thumbnail;

impl CompressionPolicy for Thumbnail {
    fn params(&self, _user_agent: Option<&str>) -> Vec<(&'static str, &'static str)> {
        vec![("w", "320"), ("br", "400")]
    }
}

#[tokio::test]
async fn test_custom_compression_policy_chooses_key() {
    let fetcher = FakeFetcher::new();
    let (storage, worker, _) = active(&fetcher).await;
    let interceptor = Interceptor::new(&worker, storage.clone(), Arc::clone(&fetcher))
        .with_policy(Arc::new(Thumbnail));

    let small = absolute(&proxied("/v/clip.mp4?w=320&br=400")).to_string();
    storage
        .put(MEDIA, &small, &StoredResponse::new(StatusCode::OK, "video/mp4", "small"))
        .await
        .unwrap();
    storage
        .put(
            MEDIA,
            &compressed_key("/v/clip.mp4"),
            &StoredResponse::new(StatusCode::OK, "video/mp4", "desktop"),
        )
        .await
        .unwrap();

    let response = interceptor.handle(cdn_request("/v/clip.mp4")).await;

    assert_eq!(response.body.as_ref(), b"small");
    assert!(fetcher.requests().is_empty());
}

// ============================================================================
// Local proxy server
// ============================================================================

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_proxy_server_routes_absolute_cdn_requests_to_media_cache() {
    let fetcher = FakeFetcher::new();
    let (storage, _worker, interceptor) = active(&fetcher).await;
    storage
        .put(
            MEDIA,
            absolute(&proxied("/i/photo.jpg")).as_str(),
            &StoredResponse::new(StatusCode::OK, "image/jpeg", "photo"),
        )
        .await
        .unwrap();
    fetcher.go_offline();

    let response = proxy_router(interceptor)
        .oneshot(
            Request::builder()
                .uri(format!("http://{CDN_HOST}/i/photo.jpg"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"photo");
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_proxy_server_resolves_paths_against_origin() {
    let fetcher = FakeFetcher::new();
    let (storage, _worker, interceptor) = active(&fetcher).await;
    storage
        .put(
            PAGES,
            absolute("/portfolios/salt").as_str(),
            &StoredResponse::new(StatusCode::OK, "text/html", "<html>salt</html>"),
        )
        .await
        .unwrap();
    fetcher.go_offline();

    let response = proxy_router(interceptor)
        .oneshot(
            Request::builder()
                .uri("/portfolios/salt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"<html>salt</html>");
}

// ============================================================================
// Pages and static assets
// ============================================================================

#[tokio::test]
async fn test_cached_page_is_served_offline() {
    let fetcher = FakeFetcher::new();
    let (storage, _worker, interceptor) = active(&fetcher).await;
    storage
        .put(
            PAGES,
            absolute("/portfolios/salt").as_str(),
            &StoredResponse::new(StatusCode::OK, "text/html", "<html>salt</html>"),
        )
        .await
        .unwrap();
    fetcher.go_offline();

    let response = interceptor.handle(get("/portfolios/salt")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_ref(), b"<html>salt</html>");
}

#[tokio::test]
async fn test_offline_styles_and_scripts_are_synthesized() {
    let fetcher = FakeFetcher::new();
    fetcher.go_offline();
    let (_storage, _worker, interceptor) = active(&fetcher).await;

    let css = interceptor.handle(get("/static/site.css")).await;
    assert_eq!(css.status, StatusCode::OK);
    assert_eq!(css.content_type(), Some("text/css"));
    assert_eq!(css.body.as_ref(), OFFLINE_ASSET_BODY.as_bytes());

    let js = interceptor.handle(get("/static/site.js")).await;
    assert_eq!(js.status, StatusCode::OK);
    assert_eq!(js.content_type(), Some("application/javascript"));

    let page = interceptor.handle(get("/portfolios/unknown")).await;
    assert_eq!(page.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_static_assets_are_stored_but_pages_are_not() {
    let fetcher = FakeFetcher::new();
    fetcher.ok("/static/site.css", "text/css", "body{}");
    fetcher.ok("/about", "text/html", "<html>about</html>");
    let (storage, _worker, interceptor) = active(&fetcher).await;

    assert_eq!(
        interceptor.handle(get("/static/site.css")).await.status,
        StatusCode::OK
    );
    assert_eq!(
        interceptor.handle(get("/about")).await.status,
        StatusCode::OK
    );

    assert_eq!(
        storage.keys(PAGES).await.unwrap(),
        vec![absolute("/static/site.css").to_string()]
    );

    // Served from the page cache from now on
    fetcher.go_offline();
    let css = interceptor.handle(get("/static/site.css")).await;
    assert_eq!(css.body.as_ref(), b"body{}");
}

// ============================================================================
// Bypass
// ============================================================================

#[tokio::test]
async fn test_not_activated_goes_to_network() {
    let fetcher = FakeFetcher::new();
    let (_pool, storage) = storage().await;
    let worker = OfflineWorker::spawn(
        worker_config(&[], false),
        storage.clone(),
        Arc::clone(&fetcher),
    );
    worker.wait_for(WorkerState::Waiting).await.unwrap();
    let interceptor = Interceptor::new(&worker, storage.clone(), Arc::clone(&fetcher));

    storage
        .put(
            PAGES,
            absolute("/portfolios/salt").as_str(),
            &StoredResponse::new(StatusCode::OK, "text/html", "cached"),
        )
        .await
        .unwrap();
    fetcher.go_offline();

    assert!(!interceptor.is_active());
    let response = interceptor.handle(get("/portfolios/salt")).await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_non_get_requests_bypass_caches() {
    let fetcher = FakeFetcher::new();
    let (storage, _worker, interceptor) = active(&fetcher).await;
    let url = absolute("/api/offline/start/p1");
    storage
        .put(
            PAGES,
            url.as_str(),
            &StoredResponse::new(StatusCode::OK, "application/json", "cached"),
        )
        .await
        .unwrap();
    fetcher.respond(
        url.as_str(),
        StoredResponse::new(StatusCode::ACCEPTED, "application/json", "live"),
    );

    let mut request = FetchRequest::get(url);
    request.method = Method::POST;
    let response = interceptor.handle(request).await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body.as_ref(), b"live");
}
