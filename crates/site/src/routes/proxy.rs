//! Same-origin proxy for CDN assets.
//!
//! The cache worker can only store responses from its own origin, so every
//! CDN asset is fetched through here.

use axum::{
    extract::{Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Assets are content-addressed on the CDN and never change.
const IMMUTABLE: &str = "public, max-age=31536000, immutable";

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

/// Parse and check a proxied URL: `https` on the CDN host only.
fn validate_target(raw: Option<&str>, cdn_host: &str) -> Result<Url> {
    let raw = raw
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing url parameter".to_string()))?;
    let url = Url::parse(raw).map_err(|e| AppError::BadRequest(format!("invalid url: {e}")))?;

    if url.scheme() != "https" {
        return Err(AppError::BadRequest("only https URLs can be proxied".to_string()));
    }
    if !url
        .host_str()
        .is_some_and(|host| host.eq_ignore_ascii_case(cdn_host))
    {
        return Err(AppError::BadRequest("host is not the asset CDN".to_string()));
    }
    Ok(url)
}

/// Fetch a CDN asset and return it with immutable caching headers.
///
/// GET /api/proxy?url=<encoded CDN URL>
pub async fn proxy(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response> {
    let url = validate_target(query.url.as_deref(), state.proxy().cdn_host())?;

    let upstream = state
        .http()
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("{url}: {e}")))?;

    let status = upstream.status();
    if !status.is_success() {
        return Err(AppError::Upstream(format!("{url}: status {status}")));
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let body = upstream
        .bytes()
        .await
        .map_err(|e| AppError::Upstream(format!("{url}: {e}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE)),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_target() {
        assert!(validate_target(Some("https://media.cdn.test/a.jpg"), "media.cdn.test").is_ok());
        assert!(validate_target(Some("https://MEDIA.cdn.test/a.jpg"), "media.cdn.test").is_ok());

        for raw in [
            None,
            Some(""),
            Some("not a url"),
            Some("http://media.cdn.test/a.jpg"),
            Some("https://evil.test/a.jpg"),
        ] {
            assert!(
                matches!(validate_target(raw, "media.cdn.test"), Err(AppError::BadRequest(_))),
                "{raw:?} should be rejected"
            );
        }
    }
}
