//! Utility modules for error handling, configuration and helper binaries

pub mod binaries;
pub mod config;
pub mod error;
pub mod paths;

// Re-export for convenience
pub use binaries::{binary_version, find_binary, resolve_binary};
pub use config::{CliArgs, ServerConfig};
pub use error::StreamgrabError;
pub use paths::ensure_downloads_dir;
