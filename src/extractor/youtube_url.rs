//! Syntactic validation of YouTube watch URLs
//!
//! Accepts the same shapes the platform hands out: `watch?v=`, `youtu.be/`,
//! and the `/embed/`, `/v/`, `/shorts/`, `/live/` path forms.

use crate::utils::error::StreamgrabError;
use url::Url;

const QUERY_HOSTS: [&str; 5] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "gaming.youtube.com",
];

const PATH_PREFIXES: [&str; 4] = ["embed", "v", "shorts", "live"];

const VIDEO_ID_LEN: usize = 11;

fn is_video_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extract the 11-character video id from a URL, if it is a YouTube video URL
pub fn parse_video_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();

    let candidate = if host == "youtu.be" {
        url.path_segments()?.next().map(str::to_string)
    } else if QUERY_HOSTS.contains(&host.as_str()) {
        let from_query = url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned());

        from_query.or_else(|| {
            let mut segments = url.path_segments()?;
            let prefix = segments.next()?;
            if PATH_PREFIXES.contains(&prefix) {
                segments.next().map(str::to_string)
            } else {
                None
            }
        })
    } else {
        None
    };

    let candidate = candidate?;
    is_video_id(&candidate).then_some(candidate)
}

/// Validate a source URL, returning the canonical watch URL on success
pub fn validate_url(raw: &str) -> Result<String, StreamgrabError> {
    parse_video_id(raw)
        .map(|id| format!("https://www.youtube.com/watch?v={}", id))
        .ok_or_else(|| StreamgrabError::InvalidUrl(raw.to_string()))
}
