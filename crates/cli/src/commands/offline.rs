//! Offline cache commands.
//!
//! # Usage
//!
//! ```bash
//! atelier cache <portfolio-id>
//! atelier status
//! atelier records
//! atelier clear [--yes]
//! ```
//!
//! `cache` runs a cache worker in-process. Pages and proxied media are fetched
//! from `ATELIER_BASE_URL`, so the site must be reachable.

use std::io::{BufRead, Write};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use atelier_core::{PortfolioId, WorkerEvent};
use atelier_site::cms::CmsClient;
use atelier_site::db::CacheStorage;
use atelier_site::offline::{
    AssetProxy, HttpFetcher, OfflineController, OfflineError, OfflineWorker, WorkerConfig,
    WorkerState,
};

use super::{CommandError, connect};

/// Cache one portfolio and wait for the run to finish.
#[allow(clippy::print_stdout)]
pub async fn cache(portfolio_id: &str) -> Result<(), CommandError> {
    let (config, pool) = connect().await?;
    let storage = CacheStorage::new(pool.clone());

    let worker = OfflineWorker::spawn(
        WorkerConfig::from_site(&config),
        storage.clone(),
        Arc::new(HttpFetcher::new()),
    );
    worker.activate().await?;
    worker.wait_for(WorkerState::Activated).await?;

    let controller = OfflineController::new(
        Some(worker.clone()),
        CmsClient::new(&config.cms),
        storage,
        pool,
        AssetProxy::new(config.offline.cdn_host.clone()),
    );

    let mut events = worker.subscribe();
    let portfolio_id = PortfolioId::new(portfolio_id);
    controller.start_caching(&portfolio_id).await?;

    let outcome = loop {
        match events.recv().await {
            Ok(WorkerEvent::CacheProgress(progress)) => {
                tracing::info!(
                    stage = %progress.stage,
                    "{}% ({}/{})",
                    progress.progress,
                    progress.current,
                    progress.total
                );
                controller.on_progress(&progress).await;
            }
            Ok(event @ WorkerEvent::CacheComplete { .. }) => {
                controller.on_complete(&event).await?;
                break Ok(());
            }
            Ok(WorkerEvent::CacheRejected { reason, .. }) => {
                break Err(CommandError::Rejected(reason));
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {skipped} progress events");
            }
            Err(RecvError::Closed) => break Err(OfflineError::WorkerStopped.into()),
        }
    };

    if outcome.is_ok() {
        println!("{}", controller.status().await);
    }
    if let Err(e) = worker.terminate().await {
        tracing::debug!("Cache worker already stopped: {e}");
    }
    outcome
}

/// Print cache usage.
#[allow(clippy::print_stdout)]
pub async fn status() -> Result<(), CommandError> {
    let (_, pool) = connect().await?;
    let status = CacheStorage::new(pool).status().await?;

    println!(
        "{} files cached ({})",
        status.file_count, status.formatted_size
    );
    Ok(())
}

/// Print cached portfolio records as a JSON array, newest first.
#[allow(clippy::print_stdout)]
pub async fn records() -> Result<(), CommandError> {
    let (_, pool) = connect().await?;
    let records = atelier_site::db::RecordRepository::new(&pool).list().await?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// Delete every cache and record, asking first unless `yes` is set.
#[allow(clippy::print_stdout)]
pub async fn clear(yes: bool) -> Result<(), CommandError> {
    if !yes && !confirm("Delete every offline cache and cached portfolio record? [y/N] ")? {
        println!("Aborted");
        return Ok(());
    }

    let (config, pool) = connect().await?;
    let storage = CacheStorage::new(pool.clone());
    let controller = OfflineController::new(
        None,
        CmsClient::new(&config.cms),
        storage,
        pool,
        AssetProxy::new(config.offline.cdn_host.clone()),
    );

    controller.clear_cache().await?;
    println!("{}", controller.status().await);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn confirm(prompt: &str) -> Result<bool, CommandError> {
    print!("{prompt}");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
