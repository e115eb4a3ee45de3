//! Download pipeline: stream fetching, transfer planning and muxing

pub mod fetcher;
pub mod merger;
pub mod transfer;

// Re-export for convenience
pub use fetcher::{ByteStream, FetchConfig, HttpStreamFetcher, StreamFetcher};
pub use merger::{select_audio_companion, FfmpegMuxer, MuxConfig, MuxOutput, Muxer};
pub use transfer::{output_filename, plan_transfer, TransferPlan};
