//! Network access for the cache worker and the interceptor.
//!
//! [`Fetcher`] is the seam between cache policy and the network: production
//! uses [`HttpFetcher`], tests script responses.

use std::future::Future;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, header};
use thiserror::Error;
use url::Url;

use super::response::StoredResponse;

/// Header browsers send to describe what a request is for (`video`, `audio`, `document`, ...).
pub const SEC_FETCH_DEST: &str = "sec-fetch-dest";

/// Errors from a network fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The resource could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The server answered with a status that cannot be cached.
    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },
}

/// A request as seen by the cache worker.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// Request body; empty for GET.
    pub body: Bytes,
}

impl FetchRequest {
    /// A plain GET with no headers.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header, ignoring values that are not valid header text.
    #[must_use]
    pub fn with_header(mut self, name: header::HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Request destination from `Sec-Fetch-Dest`.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.header(SEC_FETCH_DEST)
    }

    /// The `User-Agent` header.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.header(header::USER_AGENT.as_str())
    }

    /// The `Range` header.
    #[must_use]
    pub fn range(&self) -> Option<&str> {
        self.header(header::RANGE.as_str())
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Same request for a different URL.
    #[must_use]
    pub fn with_url(&self, url: Url) -> Self {
        Self {
            method: self.method.clone(),
            url,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    /// Same request without a `Range` header, for fetching a whole resource.
    #[must_use]
    pub fn without_range(&self) -> Self {
        let mut request = self.clone();
        request.headers.remove(header::RANGE);
        request
    }
}

/// Performs network requests on behalf of the cache worker.
pub trait Fetcher: Send + Sync + 'static {
    /// Fetch a request and buffer the whole response.
    ///
    /// Non-success statuses are returned as responses, not errors.
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<StoredResponse, FetchError>> + Send;
}

/// Hop-by-hop headers never forwarded upstream.
const SKIPPED_REQUEST_HEADERS: &[header::HeaderName] = &[
    header::HOST,
    header::CONNECTION,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// [`Fetcher`] backed by `reqwest`.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with its own connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fetcher sharing an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse, FetchError> {
        let mut headers = request.headers.clone();
        for name in SKIPPED_REQUEST_HEADERS {
            headers.remove(name);
        }

        let response = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await?;

        let status = response.status();
        let mut headers = response.headers().clone();
        headers.remove(header::TRANSFER_ENCODING);
        headers.remove(header::CONNECTION);
        let body = response.bytes().await?;

        Ok(StoredResponse {
            status,
            headers,
            body,
        })
    }
}
