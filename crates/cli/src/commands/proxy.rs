//! Kiosk proxy command.
//!
//! Serves the site on localhost through the cache interceptor, so a browser
//! pointed at it keeps showing cached portfolios when the site is unreachable.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use atelier_site::db::CacheStorage;
use atelier_site::offline::proxy_server::proxy_router;
use atelier_site::offline::{HttpFetcher, Interceptor, OfflineWorker, WorkerConfig};

use super::{CommandError, connect};

/// Run the proxy until Ctrl+C.
pub async fn serve(port: u16) -> Result<(), CommandError> {
    let (config, pool) = connect().await?;
    let storage = CacheStorage::new(pool);
    let fetcher = Arc::new(HttpFetcher::new());

    let worker = OfflineWorker::spawn(
        WorkerConfig::from_site(&config),
        storage.clone(),
        Arc::clone(&fetcher),
    );
    let app = proxy_router(Interceptor::new(&worker, storage, fetcher));

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Offline proxy for {} listening on {}", config.base_url, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {e}");
            }
        })
        .await?;

    if let Err(e) = worker.terminate().await {
        tracing::debug!("Cache worker already stopped: {e}");
    }
    Ok(())
}
