//! Local HTTP front for the interceptor.
//!
//! Origin-form requests (`GET /portfolios/salt`) are resolved against the site
//! origin. Absolute-form requests (`GET http://media.cdn.test/i/a.jpg`), sent
//! by a browser using this server as its HTTP proxy, keep their own host so
//! CDN traffic reaches the CDN rule. Either way the [`Interceptor`] answers,
//! so a kiosk browser keeps working from the caches when the site is
//! unreachable.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use url::Url;

use super::fetch::{FetchRequest, Fetcher};
use super::intercept::Interceptor;
use super::proxy_url::AssetProxy;
use super::{OfflineError, resolve_url};

/// Router answering every path through `interceptor`.
pub fn proxy_router<F: Fetcher>(interceptor: Interceptor<F>) -> Router {
    Router::new()
        .fallback(forward::<F>)
        .with_state(interceptor)
}

/// URL a proxied request is for.
///
/// CDN assets are always fetched over https, so a plain-http absolute-form
/// request for the CDN is upgraded to match the cache keys.
///
/// # Errors
///
/// Returns `OfflineError::InvalidUrl` if the URI cannot be parsed.
pub fn request_url(origin: &Url, proxy: &AssetProxy, uri: &Uri) -> Result<Url, OfflineError> {
    if uri.scheme().is_none() || uri.authority().is_none() {
        let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
        return resolve_url(origin, path);
    }

    let raw = uri.to_string();
    let mut url = Url::parse(&raw).map_err(|e| OfflineError::InvalidUrl(raw, e))?;
    if proxy.is_cdn(&url) && url.scheme() == "http" {
        // http -> https is always an allowed scheme change
        let _ = url.set_scheme("https");
    }
    Ok(url)
}

async fn forward<F: Fetcher>(
    State(interceptor): State<Interceptor<F>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = match request_url(interceptor.origin(), interceptor.proxy(), &uri) {
        Ok(url) => url,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    interceptor
        .handle(FetchRequest {
            method,
            url,
            headers,
            body,
        })
        .await
        .into_response()
}
