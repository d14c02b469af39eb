//! Headless CMS content API client.
//!
//! # Architecture
//!
//! - Queries implement `graphql_client::GraphQLQuery`, requests go through `reqwest`
//! - The CMS is source of truth - NO local sync of content, direct API calls
//! - In-memory caching via `moka` for API responses (5 minute TTL)
//!
//! The offline cache only needs portfolios and the assets of their artworks,
//! so that is all this client exposes.
//!
//! # Example
//!
//! ```rust,ignore
//! use atelier_site::cms::CmsClient;
//!
//! let client = CmsClient::new(&config.cms);
//! let portfolio = client.get_portfolio(&PortfolioId::new("clx9...")).await?;
//! for artwork in &portfolio.artworks {
//!     println!("{} ({} assets)", artwork.title, artwork.asset_urls().count());
//! }
//! ```

mod client;
mod conversions;
pub mod queries;
pub mod types;

pub use client::CmsClient;
pub use types::*;

use thiserror::Error;

/// Errors that can occur when talking to the CMS.
#[derive(Debug, Error)]
pub enum CmsError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the CMS.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),
}

/// A GraphQL error returned by the CMS.
#[derive(Debug, Clone)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Source locations in the query.
    pub locations: Vec<GraphQLErrorLocation>,
    /// Path to the error in the response.
    pub path: Vec<serde_json::Value>,
}

/// Location in a GraphQL query where an error occurred.
#[derive(Debug, Clone)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i64,
    /// Column number (1-indexed).
    pub column: i64,
}

impl GraphQLError {
    /// An error with only a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
        }
    }
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    if errors.is_empty() {
        return "(no error details provided)".to_string();
    }

    errors
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let mut parts = Vec::new();

            if !e.message.is_empty() {
                parts.push(e.message.clone());
            }

            if !e.path.is_empty() {
                let path_str = e
                    .path
                    .iter()
                    .map(|p| match p {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(".");
                parts.push(format!("path: {path_str}"));
            }

            if let Some(loc) = e.locations.first() {
                parts.push(format!("at line {}:{}", loc.line, loc.column));
            }

            if parts.is_empty() {
                format!("[error {}]: (no details)", i + 1)
            } else {
                parts.join(" ")
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cms_error_display() {
        let err = CmsError::NotFound("portfolio p1".to_string());
        assert_eq!(err.to_string(), "Not found: portfolio p1");

        let err = CmsError::RateLimited(30);
        assert_eq!(err.to_string(), "Rate limited, retry after 30 seconds");
    }

    #[test]
    fn test_graphql_error_formatting() {
        let err = CmsError::GraphQL(vec![
            GraphQLError::message("Field not found"),
            GraphQLError {
                message: String::new(),
                locations: vec![GraphQLErrorLocation { line: 3, column: 7 }],
                path: vec![
                    serde_json::Value::String("portfolio".to_string()),
                    serde_json::Value::Number(0.into()),
                ],
            },
        ]);
        assert_eq!(
            err.to_string(),
            "GraphQL errors: Field not found; path: portfolio.0 at line 3:7"
        );
    }

    #[test]
    fn test_graphql_error_without_details() {
        assert_eq!(
            CmsError::GraphQL(vec![]).to_string(),
            "GraphQL errors: (no error details provided)"
        );
        assert_eq!(
            CmsError::GraphQL(vec![GraphQLError::message("")]).to_string(),
            "GraphQL errors: [error 1]: (no details)"
        );
    }
}
