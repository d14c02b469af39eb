//! CMS content API client implementation.
//!
//! Uses `graphql_client` query bodies with `reqwest` 0.13 for HTTP.
//! Caches portfolio lookups using `moka` (5-minute TTL).

use std::sync::Arc;
use std::time::Duration;

use graphql_client::{GraphQLQuery, Response};
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument, warn};

use atelier_core::PortfolioId;

use super::conversions::{convert_portfolio, convert_portfolio_summary};
use super::queries::{
    GetPortfolio, ListPortfolios, MAX_ARTWORKS, MAX_PORTFOLIOS, get_portfolio, list_portfolios,
};
use super::types::{Portfolio, PortfolioSummary};
use super::{CmsError, GraphQLError, GraphQLErrorLocation};
use crate::config::CmsConfig;

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Portfolio(Box<Portfolio>),
    Portfolios(Vec<PortfolioSummary>),
}

/// Client for the headless CMS content API.
///
/// Portfolio lookups are cached for 5 minutes.
#[derive(Clone)]
pub struct CmsClient {
    inner: Arc<CmsClientInner>,
}

struct CmsClientInner {
    client: reqwest::Client,
    endpoint: String,
    token: Option<SecretString>,
    cache: Cache<String, CacheValue>,
}

impl CmsClient {
    /// Create a new CMS client.
    #[must_use]
    pub fn new(config: &CmsConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(500)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(CmsClientInner {
                client: reqwest::Client::new(),
                endpoint: config.endpoint.clone(),
                token: config.token.clone(),
                cache,
            }),
        }
    }

    /// Execute a GraphQL query.
    async fn execute<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
    ) -> Result<Q::ResponseData, CmsError> {
        let request_body = Q::build_query(variables);

        let mut request = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .header("Content-Type", "application/json")
            .json(&request_body);

        if let Some(token) = &self.inner.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(CmsError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "CMS returned non-success status"
            );
            return Err(CmsError::GraphQL(vec![GraphQLError::message(format!(
                "HTTP {status}: {}",
                response_text.chars().take(200).collect::<String>()
            ))]));
        }

        let response: Response<Q::ResponseData> = serde_json::from_str(&response_text)
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    body = %response_text.chars().take(500).collect::<String>(),
                    "Failed to parse CMS GraphQL response"
                );
                CmsError::Parse(e)
            })?;

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            debug!(errors = ?errors, "GraphQL errors in response");
            return Err(CmsError::GraphQL(
                errors.into_iter().map(convert_graphql_error).collect(),
            ));
        }

        response.data.ok_or_else(|| {
            tracing::error!(
                body = %response_text.chars().take(500).collect::<String>(),
                "CMS GraphQL response has no data and no errors"
            );
            CmsError::GraphQL(vec![GraphQLError::message("No data in response")])
        })
    }

    // =========================================================================
    // Portfolio Methods
    // =========================================================================

    /// Get a portfolio with all of its artworks and their assets.
    ///
    /// # Errors
    ///
    /// Returns `CmsError::NotFound` if the portfolio does not exist, or another
    /// `CmsError` if the API request fails.
    #[instrument(skip(self), fields(portfolio_id = %id))]
    pub async fn get_portfolio(&self, id: &PortfolioId) -> Result<Portfolio, CmsError> {
        let cache_key = format!("portfolio:{id}");

        if let Some(CacheValue::Portfolio(portfolio)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for portfolio");
            return Ok(*portfolio);
        }

        let data = self
            .execute::<GetPortfolio>(get_portfolio::Variables {
                id: id.to_string(),
                first: MAX_ARTWORKS,
            })
            .await?;

        let node = data
            .portfolio
            .ok_or_else(|| CmsError::NotFound(format!("Portfolio not found: {id}")))?;
        if reaches_limit(node.artworks.len(), MAX_ARTWORKS) {
            warn!(
                limit = MAX_ARTWORKS,
                "Portfolio has at least as many artworks as the query limit; extra artworks are not loaded"
            );
        }
        let portfolio = convert_portfolio(node);

        self.inner
            .cache
            .insert(cache_key, CacheValue::Portfolio(Box::new(portfolio.clone())))
            .await;

        Ok(portfolio)
    }

    /// List every portfolio, ordered by title.
    ///
    /// # Errors
    ///
    /// Returns `CmsError` if the API request fails.
    #[instrument(skip(self))]
    pub async fn list_portfolios(&self) -> Result<Vec<PortfolioSummary>, CmsError> {
        let cache_key = "portfolios".to_string();

        if let Some(CacheValue::Portfolios(portfolios)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for portfolio list");
            return Ok(portfolios);
        }

        let data = self
            .execute::<ListPortfolios>(list_portfolios::Variables {
                first: MAX_PORTFOLIOS,
            })
            .await?;

        if reaches_limit(data.portfolios.len(), MAX_PORTFOLIOS) {
            warn!(
                limit = MAX_PORTFOLIOS,
                "Portfolio listing reached the query limit; extra portfolios are not listed"
            );
        }
        let portfolios: Vec<PortfolioSummary> = data
            .portfolios
            .into_iter()
            .map(convert_portfolio_summary)
            .collect();

        self.inner
            .cache
            .insert(cache_key, CacheValue::Portfolios(portfolios.clone()))
            .await;

        Ok(portfolios)
    }
}

/// Whether a page of `count` results filled a `first: limit` query.
fn reaches_limit(count: usize, limit: i64) -> bool {
    i64::try_from(count).is_ok_and(|n| n >= limit)
}

fn convert_graphql_error(error: graphql_client::Error) -> GraphQLError {
    GraphQLError {
        message: error.message,
        locations: error.locations.map_or_else(Vec::new, |locs| {
            locs.into_iter()
                .map(|l| GraphQLErrorLocation {
                    line: i64::from(l.line),
                    column: i64::from(l.column),
                })
                .collect()
        }),
        path: error.path.map_or_else(Vec::new, |p| {
            p.into_iter()
                .map(|fragment| match fragment {
                    graphql_client::PathFragment::Key(s) => serde_json::Value::String(s),
                    graphql_client::PathFragment::Index(i) => serde_json::Value::Number(i.into()),
                })
                .collect()
        }),
    }
}
