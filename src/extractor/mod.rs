pub mod models;
pub mod traits;
pub mod youtube_url;
pub mod ytdlp;

pub use models::{Container, StreamDescriptor, VideoManifest};
pub use traits::Extractor;
pub use youtube_url::validate_url;
pub use ytdlp::YtDlpExtractor;
