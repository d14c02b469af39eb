//! Integration tests for the offline controller: runs, records and clearing.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use atelier_core::{ArtworkId, MediaUrl, PortfolioId, WorkerEvent};
use atelier_integration_tests::{
    CDN_HOST, EVENT_TIMEOUT, FakeFetcher, absolute, collect_run, controller, controller_with_cms,
    next_matching, portfolio_data, proxied, storage, stub_cms, unused_cms, worker_config,
};
use atelier_site::cms::{Artwork, ArtworkMedia, Asset, Portfolio};
use atelier_site::db::RecordRepository;
use atelier_site::offline::{OfflineController, OfflineError, OfflineWorker, WorkerState};

fn asset(path: &str) -> Option<Asset> {
    Some(Asset {
        url: format!("https://{CDN_HOST}{path}"),
        low_res_url: None,
        mime_type: None,
    })
}

/// "Salt" with two artworks: an image, and a video with a thumbnail.
fn salt() -> Portfolio {
    Portfolio {
        id: PortfolioId::new("p-salt"),
        title: "Salt".to_string(),
        slug: "salt".to_string(),
        parent: None,
        artworks: vec![
            Artwork {
                id: ArtworkId::new("a-brine"),
                title: "Brine".to_string(),
                slug: "brine".to_string(),
                year: Some(2023),
                medium: Some("Photograph".to_string()),
                media: ArtworkMedia {
                    image: asset("/i/brine.jpg"),
                    ..ArtworkMedia::default()
                },
            },
            Artwork {
                id: ArtworkId::new("a-crust"),
                title: "Crust".to_string(),
                slug: "crust".to_string(),
                year: None,
                medium: None,
                media: ArtworkMedia {
                    video: asset("/v/crust.mp4"),
                    video_thumbnail: asset("/i/crust.jpg"),
                    ..ArtworkMedia::default()
                },
            },
        ],
    }
}

/// A fetcher answering every page and asset of [`salt`].
fn salt_fetcher() -> Arc<FakeFetcher> {
    let fetcher = FakeFetcher::new();
    fetcher.ok("/portfolios/salt", "text/html", "<html>salt</html>");
    fetcher.ok("/portfolios/salt/brine", "text/html", "<html>brine</html>");
    fetcher.ok("/portfolios/salt/crust", "text/html", "<html>crust</html>");
    fetcher.ok(&proxied("/i/brine.jpg"), "image/jpeg", vec![0u8; 32]);
    fetcher.ok(&proxied("/v/crust.mp4"), "video/mp4", vec![0u8; 128]);
    fetcher.ok(&proxied("/i/crust.jpg"), "image/jpeg", vec![0u8; 16]);
    fetcher
}

async fn wait_for_records(controller: &OfflineController, count: usize) {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            if controller.records().await.unwrap().len() == count {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_listener_records_completed_portfolio() {
    let (pool, storage) = storage().await;
    let worker = OfflineWorker::spawn(worker_config(&[], true), storage.clone(), salt_fetcher());
    worker.wait_for(WorkerState::Activated).await.unwrap();

    let controller = controller(&pool, &storage, Some(worker.clone()));
    let _listener = controller.spawn_event_listener().unwrap();

    controller.start_caching_portfolio(&salt()).await.unwrap();
    wait_for_records(&controller, 1).await;

    let record = RecordRepository::new(&pool)
        .get(&PortfolioId::new("p-salt"))
        .await
        .unwrap();
    assert_eq!(record.title, "Salt");
    assert_eq!(record.slug, "salt");
    assert_eq!(record.media_count, 3);

    // 1 portfolio page + 2 artwork pages + 3 media files
    let status = controller.cache_status().await.unwrap();
    assert_eq!(status.file_count, 6);
}

#[tokio::test]
async fn test_rerun_keeps_one_record() {
    let (pool, storage) = storage().await;
    let worker = OfflineWorker::spawn(worker_config(&[], true), storage.clone(), salt_fetcher());
    worker.wait_for(WorkerState::Activated).await.unwrap();
    let controller = controller(&pool, &storage, Some(worker.clone()));
    let mut events = worker.subscribe();

    for _ in 0..2 {
        controller.start_caching_portfolio(&salt()).await.unwrap();
        let complete = next_matching(&mut events, |e| {
            matches!(e, WorkerEvent::CacheComplete { .. })
        })
        .await;
        controller.on_complete(&complete).await.unwrap();
    }

    let records = controller.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, PortfolioId::new("p-salt"));
    assert_eq!(controller.progress().await, 100);
    assert!(controller.status().await.contains("available offline"));
}

#[tokio::test]
async fn test_clear_removes_caches_and_records() {
    let (pool, storage) = storage().await;
    let fetcher = salt_fetcher();
    fetcher.ok("/", "text/html", "<html>home</html>");
    let worker = OfflineWorker::spawn(worker_config(&["/"], true), storage.clone(), fetcher);
    worker.wait_for(WorkerState::Activated).await.unwrap();
    let controller = controller(&pool, &storage, Some(worker.clone()));
    let mut events = worker.subscribe();

    controller.start_caching_portfolio(&salt()).await.unwrap();
    let complete = next_matching(&mut events, |e| {
        matches!(e, WorkerEvent::CacheComplete { .. })
    })
    .await;
    controller.on_complete(&complete).await.unwrap();
    assert_eq!(controller.cache_status().await.unwrap().file_count, 7);

    controller.clear_cache().await.unwrap();

    let status = controller.cache_status().await.unwrap();
    assert_eq!(status.file_count, 0);
    assert_eq!(status.total_size, 0);
    assert!(controller.records().await.unwrap().is_empty());
    assert!(storage.names().await.unwrap().is_empty());
    assert_eq!(controller.progress().await, 0);
}

#[tokio::test]
async fn test_no_worker_is_rejected_without_persisting() {
    let (pool, storage) = storage().await;
    let controller = controller(&pool, &storage, None);

    let result = controller.start_caching_portfolio(&salt()).await;

    assert!(matches!(result, Err(OfflineError::NoActiveWorker)));
    assert_eq!(controller.status().await, "Offline caching is not available");
    assert!(controller.records().await.unwrap().is_empty());
    assert_eq!(controller.cache_status().await.unwrap().file_count, 0);
    assert!(controller.spawn_event_listener().is_none());
}

#[tokio::test]
async fn test_waiting_worker_is_not_active() {
    let (pool, storage) = storage().await;
    let fetcher = salt_fetcher();
    let worker = OfflineWorker::spawn(worker_config(&[], false), storage.clone(), fetcher.clone());
    worker.wait_for(WorkerState::Waiting).await.unwrap();
    let controller = controller(&pool, &storage, Some(worker));

    let result = controller.start_caching_portfolio(&salt()).await;

    assert!(matches!(result, Err(OfflineError::NoActiveWorker)));
    assert!(fetcher.requests().is_empty());
}

// ============================================================================
// Discovery through the CMS
// ============================================================================

/// CMS payload for "Salt", with the video thumbnail reusing the image.
fn salt_payload() -> serde_json::Value {
    serde_json::json!({
        "portfolio": {
            "id": "p-salt",
            "title": "Salt",
            "slug": "salt",
            "parent": null,
            "artworks": [
                {
                    "id": "a-brine",
                    "title": "Brine",
                    "slug": "brine",
                    "image": { "url": format!("https://{CDN_HOST}/i/brine.jpg"), "mimeType": "image/jpeg" }
                },
                {
                    "id": "a-crust",
                    "title": "Crust",
                    "slug": "crust",
                    "video": { "url": format!("https://{CDN_HOST}/v/crust.mp4"), "mimeType": "video/mp4" },
                    "videoThumbnail": { "url": format!("https://{CDN_HOST}/i/brine.jpg"), "mimeType": "image/jpeg" }
                }
            ]
        }
    })
}

#[tokio::test]
async fn test_start_caching_discovers_unique_proxied_media() {
    let (pool, storage) = storage().await;
    let fetcher = salt_fetcher();
    let worker = OfflineWorker::spawn(worker_config(&[], true), storage.clone(), fetcher.clone());
    worker.wait_for(WorkerState::Activated).await.unwrap();
    let cms = stub_cms(salt_payload()).await;
    let controller = controller_with_cms(&pool, &storage, Some(worker.clone()), cms);
    let mut events = worker.subscribe();

    let collected = controller
        .collect_media_urls(&PortfolioId::new("p-salt"))
        .await
        .unwrap();
    let urls: Vec<&str> = collected.urls.iter().map(MediaUrl::as_str).collect();
    assert_eq!(urls, vec![proxied("/i/brine.jpg"), proxied("/v/crust.mp4")]);

    controller
        .start_caching(&PortfolioId::new("p-salt"))
        .await
        .unwrap();
    let seen = collect_run(&mut events).await;

    let Some(WorkerEvent::CacheComplete {
        cached,
        total,
        portfolio_data,
        ..
    }) = seen.last()
    else {
        panic!("run should end with CACHE_COMPLETE");
    };
    assert_eq!((*cached, *total), (2, 2));
    assert_eq!(portfolio_data.slug, "salt");

    let media_fetched: Vec<String> = fetcher
        .requested_urls()
        .into_iter()
        .filter(|url| url.contains("/api/proxy"))
        .collect();
    assert_eq!(
        media_fetched,
        vec![
            absolute(&proxied("/i/brine.jpg")).to_string(),
            absolute(&proxied("/v/crust.mp4")).to_string(),
        ]
    );
}

#[tokio::test]
async fn test_unreachable_cms_fails_without_persisting() {
    let (pool, storage) = storage().await;
    let fetcher = salt_fetcher();
    let worker = OfflineWorker::spawn(worker_config(&[], true), storage.clone(), fetcher.clone());
    worker.wait_for(WorkerState::Activated).await.unwrap();
    let controller = controller_with_cms(&pool, &storage, Some(worker), unused_cms());

    let result = controller.start_caching(&PortfolioId::new("p-salt")).await;

    assert!(matches!(result, Err(OfflineError::Cms(_))));
    assert!(!controller.status().await.is_empty());
    assert!(controller.records().await.unwrap().is_empty());
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_rejected_run_updates_status() {
    let (pool, storage) = storage().await;
    let controller = controller(&pool, &storage, None);

    controller
        .dispatch(&WorkerEvent::CacheRejected {
            portfolio_slug: "tide".to_string(),
            reason: "another portfolio is being cached".to_string(),
        })
        .await;

    assert_eq!(
        controller.status().await,
        "Could not cache tide: another portfolio is being cached"
    );
}

#[tokio::test]
async fn test_progress_events_update_display() {
    let (pool, storage) = storage().await;
    let controller = controller(&pool, &storage, None);

    controller
        .dispatch(&WorkerEvent::CacheProgress(atelier_core::CacheProgress::new(
            3,
            4,
            atelier_core::CacheStage::MediaFiles,
        )))
        .await;

    assert_eq!(controller.progress().await, 75);
}

#[tokio::test]
async fn test_completion_for_other_portfolio_is_recorded_separately() {
    let (pool, storage) = storage().await;
    let controller = controller(&pool, &storage, None);

    for slug in ["salt", "tide"] {
        controller
            .on_complete(&WorkerEvent::CacheComplete {
                cached: 0,
                total: 0,
                portfolio_data: portfolio_data(slug, &[]),
                media_count: 0,
                total_items_cached: 1,
                total_items: 1,
                artwork_pages_cached: 0,
            })
            .await
            .unwrap();
    }

    assert_eq!(controller.records().await.unwrap().len(), 2);
}
