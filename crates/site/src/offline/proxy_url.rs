//! Same-origin proxy URLs for CDN assets.
//!
//! CDN responses cannot be cached from another origin, so every CDN asset is
//! addressed as `/api/proxy?url=<percent-encoded CDN URL>`.

use url::Url;

/// Path of the asset proxy endpoint.
pub const PROXY_PATH: &str = "/api/proxy";

/// Rewrites CDN asset URLs into proxy URLs and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetProxy {
    cdn_host: String,
}

impl AssetProxy {
    /// Create a proxy for assets served from `cdn_host`.
    #[must_use]
    pub fn new(cdn_host: impl Into<String>) -> Self {
        Self {
            cdn_host: cdn_host.into().to_ascii_lowercase(),
        }
    }

    /// The CDN host name.
    #[must_use]
    pub fn cdn_host(&self) -> &str {
        &self.cdn_host
    }

    /// Whether the URL points at the asset CDN.
    #[must_use]
    pub fn is_cdn(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(&self.cdn_host))
    }

    /// Proxy path for an absolute URL.
    #[must_use]
    pub fn proxy_path(url: &str) -> String {
        format!("{PROXY_PATH}?url={}", urlencoding::encode(url))
    }

    /// Rewrite a raw asset URL: absolute CDN URLs become proxy paths, anything
    /// else is returned unchanged.
    #[must_use]
    pub fn rewrite(&self, raw: &str) -> String {
        match Url::parse(raw) {
            Ok(url) if self.is_cdn(&url) => Self::proxy_path(raw),
            _ => raw.to_string(),
        }
    }

    /// The CDN URL wrapped by a proxy URL, if `url` is one.
    #[must_use]
    pub fn inner_url(url: &Url) -> Option<Url> {
        if url.path() != PROXY_PATH {
            return None;
        }
        url.query_pairs()
            .find(|(key, _)| key == "url")
            .and_then(|(_, value)| Url::parse(&value).ok())
    }
}
