//! streamgrab library
//!
//! Resolves a video URL into display-ready metadata and streams a selected
//! format to the client, muxing separate video and audio streams on the fly.

pub mod downloader;
pub mod extractor;
pub mod formats;
pub mod server;
pub mod utils;

// Re-export main types for easier use
pub use downloader::{FfmpegMuxer, HttpStreamFetcher, Muxer, StreamFetcher, TransferPlan};
pub use extractor::{Extractor, StreamDescriptor, VideoManifest, YtDlpExtractor};
pub use server::{build_router, run_server, AppState};
pub use utils::{ServerConfig, StreamgrabError};
