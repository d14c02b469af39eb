//! Offline caching page and API.
//!
//! The page lists cached portfolios and cache usage; progress arrives over
//! the SSE stream of worker events.

use std::convert::Infallible;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Sse,
        sse::{Event, KeepAlive},
    },
};
use serde::Serialize;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

use atelier_core::{CacheStatus, PortfolioCacheRecord, PortfolioId};

use crate::cms::PortfolioSummary;
use crate::error::{AppError, Result};
use crate::offline::OfflineError;
use crate::state::AppState;

/// Record row on the offline page.
#[derive(Debug, Clone)]
pub struct RecordView {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub cached_at: String,
    pub media_count: u32,
}

impl From<&PortfolioCacheRecord> for RecordView {
    fn from(record: &PortfolioCacheRecord) -> Self {
        Self {
            id: record.id.to_string(),
            title: record.title.clone(),
            slug: record.slug.clone(),
            cached_at: record.cached_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            media_count: record.media_count,
        }
    }
}

/// Portfolio that can be cached.
#[derive(Debug, Clone)]
pub struct AvailableView {
    pub id: String,
    pub title: String,
    pub artwork_count: usize,
    pub cached: bool,
}

/// Offline page template.
#[derive(Template, WebTemplate)]
#[template(path = "offline.html")]
pub struct OfflinePageTemplate {
    pub records: Vec<RecordView>,
    pub available: Vec<AvailableView>,
    pub status: CacheStatus,
    pub worker_state: String,
    pub message: String,
    pub progress: u8,
}

/// Render the offline page.
///
/// GET /offline
pub async fn page(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let controller = state.controller();
    let records = controller.records().await?;
    let status = controller.cache_status().await?;

    let available = state.cms().list_portfolios().await.map_or_else(
        |e| {
            tracing::error!("Failed to list portfolios: {e}");
            Vec::new()
        },
        |portfolios| available_views(&portfolios, &records),
    );

    let worker_state = controller
        .worker()
        .map_or_else(|| "unavailable".to_string(), |w| w.state().to_string());

    Ok(OfflinePageTemplate {
        records: records.iter().map(RecordView::from).collect(),
        available,
        status,
        worker_state,
        message: controller.status().await,
        progress: controller.progress().await,
    })
}

fn available_views(
    portfolios: &[PortfolioSummary],
    records: &[PortfolioCacheRecord],
) -> Vec<AvailableView> {
    portfolios
        .iter()
        .map(|p| AvailableView {
            id: p.id.to_string(),
            title: p.title.clone(),
            artwork_count: p.artwork_count,
            cached: records.iter().any(|r| r.id == p.id),
        })
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    portfolio_id: PortfolioId,
    status: String,
}

/// Start caching a portfolio.
///
/// POST /api/offline/portfolios/{id}
pub async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let portfolio_id = PortfolioId::new(id);
    state.controller().start_caching(&portfolio_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartResponse {
            portfolio_id,
            status: state.controller().status().await,
        }),
    ))
}

/// Cache usage across every named cache.
///
/// GET /api/offline/status
pub async fn status(State(state): State<AppState>) -> Result<Json<CacheStatus>> {
    Ok(Json(state.controller().cache_status().await?))
}

/// Cached portfolio records, newest first.
///
/// GET /api/offline/records
pub async fn records(State(state): State<AppState>) -> Result<Json<Vec<PortfolioCacheRecord>>> {
    Ok(Json(state.controller().records().await?))
}

/// Delete every cache and record.
///
/// DELETE /api/offline/cache
pub async fn clear(State(state): State<AppState>) -> Result<StatusCode> {
    state.controller().clear_cache().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stream worker events to the page.
///
/// GET /api/offline/events
pub async fn events(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let worker = state
        .controller()
        .worker()
        .ok_or(AppError::Offline(OfflineError::NoActiveWorker))?;

    // Lagged receivers skip the missed events.
    let stream = BroadcastStream::new(worker.subscribe()).filter_map(|event| {
        let event = event.ok()?;
        let json = serde_json::to_string(&event).unwrap_or_else(|_| {
            r#"{"type":"ERROR","message":"Failed to serialize event"}"#.to_string()
        });
        Some(Ok(Event::default().data(json)))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
