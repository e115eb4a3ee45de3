//! Server configuration

use crate::utils::error::StreamgrabError;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Command-line flags, each also readable from the environment
#[derive(Debug, Parser)]
#[command(name = "streamgrab", version, about = "Video metadata and download service")]
pub struct CliArgs {
    /// Address to bind
    #[arg(long, env = "STREAMGRAB_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Directory created at startup for downloads
    #[arg(long, env = "STREAMGRAB_DOWNLOADS_DIR", default_value = "./downloads")]
    pub downloads_dir: PathBuf,

    /// Path to yt-dlp (searched for when omitted)
    #[arg(long, env = "STREAMGRAB_YTDLP")]
    pub ytdlp: Option<PathBuf>,

    /// Path to ffmpeg (searched for when omitted)
    #[arg(long, env = "STREAMGRAB_FFMPEG")]
    pub ffmpeg: Option<PathBuf>,

    /// Read size for muxer output, in bytes
    #[arg(long, env = "STREAMGRAB_CHUNK_SIZE", default_value_t = 64 * 1024)]
    pub chunk_size: usize,
}

/// Runtime configuration of the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub downloads_dir: PathBuf,
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    /// Chunk size for streaming (bytes)
    pub chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            downloads_dir: PathBuf::from("./downloads"),
            ytdlp_path: None,
            ffmpeg_path: None,
            chunk_size: 64 * 1024, // 64KB
        }
    }
}

impl From<CliArgs> for ServerConfig {
    fn from(args: CliArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            downloads_dir: args.downloads_dir,
            ytdlp_path: args.ytdlp,
            ffmpeg_path: args.ffmpeg,
            chunk_size: args.chunk_size,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), StreamgrabError> {
        if self.port == 0 {
            return Err(StreamgrabError::InvalidConfig(
                "port must be non-zero".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(StreamgrabError::InvalidConfig(
                "chunk size must be non-zero".to_string(),
            ));
        }
        self.socket_addr().map(|_| ())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, StreamgrabError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| StreamgrabError::InvalidConfig(format!("bad listen address: {}", e)))
    }
}
