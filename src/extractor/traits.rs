use crate::extractor::models::VideoManifest;
use anyhow::Result;
use async_trait::async_trait;

/// Core trait for metadata extractors
///
/// This trait isolates the service from the specific extraction method
/// (yt-dlp today). Implementations must resolve a fresh manifest on every
/// call; stream URLs are signed and expire, so nothing may be cached.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns a unique identifier for this extractor (e.g., "ytdlp")
    fn id(&self) -> &'static str;

    /// Checks if this extractor can handle the given URL
    fn supports(&self, url: &str) -> bool;

    /// Resolves the manifest of available streams for a video
    async fn extract_info(&self, url: &str) -> Result<VideoManifest>;
}
