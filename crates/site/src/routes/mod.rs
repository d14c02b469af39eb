//! HTTP route handlers for the site.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                         - Health check
//! GET    /health/ready                   - Readiness (database)
//! GET    /offline                        - Offline caching page
//!
//! # Assets
//! GET    /api/proxy?url=                 - Same-origin proxy for CDN assets
//!
//! # Offline cache API
//! POST   /api/offline/portfolios/{id}    - Start caching a portfolio (202)
//! GET    /api/offline/status             - Cache usage
//! GET    /api/offline/records            - Cached portfolio records
//! DELETE /api/offline/cache              - Clear every cache and record
//! GET    /api/offline/events             - Worker events (SSE)
//!
//! # Content
//! GET    /api/portfolios                 - Portfolio summaries
//! ```

pub mod offline;
pub mod portfolios;
pub mod proxy;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Create the offline cache API router.
pub fn offline_api_routes() -> Router<AppState> {
    Router::new()
        .route("/portfolios/{id}", post(offline::start))
        .route("/status", get(offline::status))
        .route("/records", get(offline::records))
        .route("/cache", delete(offline::clear))
        .route("/events", get(offline::events))
}

/// Create the main application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/offline", get(offline::page))
        .route("/api/proxy", get(proxy::proxy))
        .route("/api/portfolios", get(portfolios::list))
        .nest("/api/offline", offline_api_routes())
}
