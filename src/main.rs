//! streamgrab - video metadata and streaming download service
//!
//! Serves `POST /metadata` and `POST /download` on top of yt-dlp for manifest
//! resolution and ffmpeg for muxing separate video and audio streams.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use streamgrab::downloader::{FetchConfig, MuxConfig};
use streamgrab::utils::{self, CliArgs, ServerConfig};
use streamgrab::{AppState, FfmpegMuxer, HttpStreamFetcher, YtDlpExtractor};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from(CliArgs::parse());

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    config.validate().context("invalid configuration")?;
    let addr = config.socket_addr()?;

    let downloads_dir = utils::ensure_downloads_dir(&config.downloads_dir)
        .context("failed to prepare downloads directory")?;
    info!("Downloads directory: {}", downloads_dir.display());

    let extractor = match YtDlpExtractor::new(config.ytdlp_path.as_deref()) {
        Ok(extractor) => {
            check_version(extractor.ytdlp_path(), "--version", "yt-dlp");
            extractor
        }
        Err(e) => {
            // Keep serving; metadata requests will fail until it is installed
            warn!("{}", e);
            warn!("Install yt-dlp: pip install yt-dlp, or see https://github.com/yt-dlp/yt-dlp");
            YtDlpExtractor::with_path(PathBuf::from("yt-dlp"))
        }
    };

    let ffmpeg_path = match utils::resolve_binary(config.ffmpeg_path.as_deref(), "ffmpeg") {
        Some(path) => {
            check_version(&path, "-version", "ffmpeg");
            path
        }
        None => {
            warn!("ffmpeg not found; downloads that need merging will fail");
            PathBuf::from("ffmpeg")
        }
    };

    let fetcher = HttpStreamFetcher::new(FetchConfig::default())?;
    let muxer = FfmpegMuxer::new(MuxConfig {
        ffmpeg_path,
        chunk_size: config.chunk_size,
        ..Default::default()
    });

    let state = AppState::new(Arc::new(extractor), Arc::new(fetcher), Arc::new(muxer));

    streamgrab::run_server(state, addr).await?;
    Ok(())
}

fn check_version(path: &std::path::Path, flag: &str, name: &str) {
    match utils::binary_version(path, flag) {
        Some(version) => info!("✓ {} {}", name, version),
        None => warn!("{} at {} did not answer {}", name, path.display(), flag),
    }
}
