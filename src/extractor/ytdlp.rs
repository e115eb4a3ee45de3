//! yt-dlp wrapper for manifest extraction
//!
//! Runs `yt-dlp --dump-json` once per request and hands the JSON to the
//! ingestion boundary in [`crate::extractor::models`].

use crate::extractor::models::VideoManifest;
use crate::extractor::traits::Extractor;
use crate::extractor::youtube_url;
use crate::utils::binaries;
use crate::utils::error::StreamgrabError;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, error, info};

/// How long a single metadata resolution may take
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Manifest extractor backed by the yt-dlp binary
pub struct YtDlpExtractor {
    ytdlp_path: PathBuf,
}

impl YtDlpExtractor {
    /// Initialize extractor and verify yt-dlp availability
    pub fn new(configured: Option<&Path>) -> Result<Self, StreamgrabError> {
        let ytdlp_path = match binaries::resolve_binary(configured, "yt-dlp") {
            Some(path) => {
                info!("Found yt-dlp at: {}", path.display());
                path
            }
            None => {
                error!("yt-dlp not found anywhere!");
                return Err(StreamgrabError::YtDlpNotFound);
            }
        };

        Ok(Self { ytdlp_path })
    }

    /// Use a fixed binary path without discovery
    pub fn with_path(ytdlp_path: PathBuf) -> Self {
        Self { ytdlp_path }
    }

    /// Get the path to yt-dlp being used
    pub fn ytdlp_path(&self) -> &Path {
        &self.ytdlp_path
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn id(&self) -> &'static str {
        "ytdlp"
    }

    fn supports(&self, url: &str) -> bool {
        youtube_url::parse_video_id(url).is_some()
    }

    /// Uses: yt-dlp --dump-json --no-download --no-playlist
    async fn extract_info(&self, url: &str) -> Result<VideoManifest> {
        debug!("Extracting video info for URL: {}", url);

        let child = AsyncCommand::new(&self.ytdlp_path)
            .arg("--dump-json")
            .arg("--no-download")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(EXTRACT_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                StreamgrabError::ResolutionFailed(format!(
                    "yt-dlp timed out after {}s",
                    EXTRACT_TIMEOUT.as_secs()
                ))
            })??;

        if !output.status.success() {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            error!("yt-dlp extraction failed: {}", error_msg.trim());
            return Err(StreamgrabError::ResolutionFailed(error_msg.trim().to_string()).into());
        }

        let json_str = String::from_utf8(output.stdout)?;
        let manifest = VideoManifest::from_ytdlp_json(&json_str)?;

        info!(
            "Resolved \"{}\" with {} streams",
            manifest.title,
            manifest.streams.len()
        );
        Ok(manifest)
    }
}
