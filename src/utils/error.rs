//! Error handling for streamgrab

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Main error type for streamgrab
#[derive(Debug, Error)]
pub enum StreamgrabError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid video URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to resolve video information: {0}")]
    ResolutionFailed(String),

    #[error("Format not found: {0}")]
    FormatNotFound(String),

    #[error("No audio stream found to merge")]
    NoAudioStreamFound,

    #[error("Unsupported format selection: {0}")]
    UnsupportedSelection(String),

    #[error("Merging failed: {0}")]
    MergeFailed(String),

    #[error("Transfer aborted: {0}")]
    TransferAborted(String),

    #[error("yt-dlp not found. Please install yt-dlp")]
    YtDlpNotFound,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl StreamgrabError {
    /// Stable identifier sent to clients in the `kind` field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::InvalidUrl(_) => "InvalidUrl",
            Self::ResolutionFailed(_) => "ResolutionFailed",
            Self::FormatNotFound(_) => "FormatNotFound",
            Self::NoAudioStreamFound => "NoAudioStreamFound",
            Self::UnsupportedSelection(_) => "UnsupportedSelection",
            Self::MergeFailed(_) => "MergeFailed",
            Self::TransferAborted(_) => "TransferAborted",
            Self::YtDlpNotFound => "YtDlpNotFound",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::IoError(_) => "IoError",
            Self::SerializationError(_) => "SerializationError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidUrl(_)
            | Self::FormatNotFound(_)
            | Self::NoAudioStreamFound
            | Self::UnsupportedSelection(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to a client.
    ///
    /// Upstream and process failures carry stderr excerpts and signed URLs in
    /// their detail, so those are replaced by a fixed message and only logged.
    pub fn public_message(&self) -> String {
        match self {
            Self::ResolutionFailed(_) | Self::YtDlpNotFound => {
                "Failed to fetch video information".to_string()
            }
            Self::MergeFailed(_) => "Merging failed".to_string(),
            Self::InvalidUrl(_) => "Invalid video URL".to_string(),
            Self::IoError(_) | Self::SerializationError(_) | Self::InvalidConfig(_) => {
                "Download failed".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for StreamgrabError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(kind = self.kind(), "Request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.public_message(),
            "kind": self.kind(),
        }));
        (status, body).into_response()
    }
}
