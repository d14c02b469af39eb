//! Portfolio listing for the offline page.

use axum::{Json, extract::State};

use crate::cms::PortfolioSummary;
use crate::error::Result;
use crate::state::AppState;

/// Every portfolio the CMS knows about.
///
/// GET /api/portfolios
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<PortfolioSummary>>> {
    Ok(Json(state.cms().list_portfolios().await?))
}
