//! Media URL type.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// An opaque reference to a fetchable media resource (image, video, audio, PDF).
///
/// For CDN assets this is always the same-origin proxy form
/// (`/api/proxy?url=...`) so the offline cache can capture the response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaUrl(String);

impl MediaUrl {
    /// Wrap a URL string.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Borrow the URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MediaUrl {
    fn from(url: String) -> Self {
        Self(url)
    }
}

impl AsRef<str> for MediaUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Remove duplicate URLs, keeping the first occurrence of each in order.
#[must_use]
pub fn dedup_media_urls<I>(urls: I) -> Vec<MediaUrl>
where
    I: IntoIterator<Item = MediaUrl>,
{
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
