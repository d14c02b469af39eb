//! Request classification and the video compression policy.
//!
//! The compression policy only decides which transcode parameters a video URL
//! gets; the interceptor applies whatever the policy returns.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Video container extensions that accept transcode parameters.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "webm", "ogv"];

/// Audio extensions served with byte-range support.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "wav", "ogg", "oga", "flac", "opus"];

/// Query keys that mark a URL as already transcoded.
const TRANSCODE_KEYS: &[&str] = &["w", "br"];

static MOBILE_UA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)mobi|android|iphone|ipad|ipod|blackberry|opera mini|iemobile")
        .expect("Invalid regex")
});

/// Chooses transcode parameters for video requests to the asset CDN.
pub trait CompressionPolicy: Send + Sync {
    /// Query parameters to append for a client with this user agent.
    ///
    /// An empty list leaves the URL untouched.
    fn params(&self, user_agent: Option<&str>) -> Vec<(&'static str, &'static str)>;
}

/// Lower resolution and bitrate for mobile user agents, higher for everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAgentCompression;

impl CompressionPolicy for UserAgentCompression {
    fn params(&self, user_agent: Option<&str>) -> Vec<(&'static str, &'static str)> {
        if user_agent.is_some_and(is_mobile_user_agent) {
            vec![("w", "720"), ("br", "1500")]
        } else {
            vec![("w", "1920"), ("br", "5000")]
        }
    }
}

/// Whether the user agent looks like a phone or tablet.
#[must_use]
pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    MOBILE_UA_RE.is_match(user_agent)
}

fn extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let (_, ext) = segment.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Whether the URL path ends in a video container extension.
#[must_use]
pub fn is_video_container(url: &Url) -> bool {
    extension(url).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether the URL path ends in an audio or video extension.
#[must_use]
pub fn has_media_extension(url: &Url) -> bool {
    extension(url).is_some_and(|ext| {
        VIDEO_EXTENSIONS.contains(&ext.as_str()) || AUDIO_EXTENSIONS.contains(&ext.as_str())
    })
}

/// Whether a `Sec-Fetch-Dest` value names an audio or video element.
#[must_use]
pub fn is_media_destination(destination: Option<&str>) -> bool {
    matches!(destination, Some("audio" | "video" | "track"))
}

/// Whether the URL already carries transcode parameters.
#[must_use]
pub fn has_transcode_params(url: &Url) -> bool {
    url.query_pairs()
        .any(|(key, _)| TRANSCODE_KEYS.contains(&key.as_ref()))
}

/// Whether the URL is a stylesheet or script.
#[must_use]
pub fn is_style_or_script(url: &Url) -> bool {
    matches!(extension(url).as_deref(), Some("css" | "js" | "mjs"))
}

/// Whether a successful response for this URL belongs in the page cache:
/// static build output, stylesheets and scripts.
#[must_use]
pub fn is_static_asset(url: &Url) -> bool {
    url.path().starts_with("/static/") || is_style_or_script(url)
}

/// Append compression parameters to a video URL that has none.
///
/// Returns `None` when the URL is not a video container, already carries
/// transcode parameters, or the policy has nothing to add.
#[must_use]
pub fn compressed_url(
    url: &Url,
    policy: &dyn CompressionPolicy,
    user_agent: Option<&str>,
) -> Option<Url> {
    if !is_video_container(url) || has_transcode_params(url) {
        return None;
    }

    let params = policy.params(user_agent);
    if params.is_empty() {
        return None;
    }

    let mut compressed = url.clone();
    compressed.query_pairs_mut().extend_pairs(params);
    Some(compressed)
}
