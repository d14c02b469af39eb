//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::cms::CmsError;
use crate::db::RepositoryError;
use crate::offline::OfflineError;

/// Application-level error type for the site.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// CMS API operation failed.
    #[error("CMS error: {0}")]
    Cms(#[from] CmsError),

    /// Offline cache operation failed.
    #[error("Offline cache error: {0}")]
    Offline(#[from] OfflineError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Upstream asset host failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) | Self::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Cms(err) => cms_status(err),
            Self::Offline(err) => match err {
                OfflineError::NoActiveWorker | OfflineError::WorkerStopped => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                OfflineError::Cms(err) => cms_status(err),
                OfflineError::InvalidUrl(..) => StatusCode::BAD_REQUEST,
                OfflineError::Fetch(_) => StatusCode::BAD_GATEWAY,
                OfflineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn is_server_error(&self) -> bool {
        match self {
            Self::Database(_) | Self::Internal(_) | Self::Upstream(_) => true,
            Self::Cms(err) | Self::Offline(OfflineError::Cms(err)) => {
                !matches!(err, CmsError::NotFound(_))
            }
            Self::Offline(OfflineError::Storage(_) | OfflineError::Fetch(_)) => true,
            _ => false,
        }
    }
}

fn cms_status(err: &CmsError) -> StatusCode {
    match err {
        CmsError::NotFound(_) => StatusCode::NOT_FOUND,
        CmsError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_)
            | Self::Internal(_)
            | Self::Offline(OfflineError::Storage(_)) => "Internal server error".to_string(),
            Self::Upstream(_) => "Failed to fetch asset".to_string(),
            Self::Cms(CmsError::NotFound(_))
            | Self::Offline(OfflineError::Cms(CmsError::NotFound(_))) => {
                "Portfolio not found".to_string()
            }
            Self::Cms(_) | Self::Offline(OfflineError::Cms(_) | OfflineError::Fetch(_)) => {
                "External service error".to_string()
            }
            Self::Offline(OfflineError::NoActiveWorker | OfflineError::WorkerStopped) => {
                "Offline caching is not available".to_string()
            }
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
