//! Decides how a selected stream reaches the client

use crate::downloader::merger::select_audio_companion;
use crate::extractor::models::{StreamDescriptor, VideoManifest};
use crate::utils::error::StreamgrabError;

/// Container and content type of muxed output
pub const MUXED_EXTENSION: &str = "mp4";
pub const MUXED_CONTENT_TYPE: &str = "video/mp4";

const FALLBACK_FILENAME: &str = "video";

/// How the bytes for one download are produced
#[derive(Debug, Clone, PartialEq)]
pub enum TransferPlan {
    /// Relay one stream as-is
    Direct { stream: StreamDescriptor },
    /// Mux a video-only stream with an audio companion
    Mux {
        video: StreamDescriptor,
        audio: StreamDescriptor,
    },
}

impl TransferPlan {
    pub fn is_mux(&self) -> bool {
        matches!(self, TransferPlan::Mux { .. })
    }

    pub fn extension(&self) -> String {
        match self {
            TransferPlan::Direct { stream } => stream.container.extension().to_string(),
            TransferPlan::Mux { .. } => MUXED_EXTENSION.to_string(),
        }
    }

    pub fn content_type(&self) -> String {
        match self {
            TransferPlan::Direct { stream } => stream.mime_type.clone(),
            TransferPlan::Mux { .. } => MUXED_CONTENT_TYPE.to_string(),
        }
    }
}

/// Resolve a stream id against a manifest into a transfer plan.
///
/// Muxed and audio-only streams are relayed directly; video-only streams are
/// paired with an audio companion, failing before any process is spawned when
/// none exists.
pub fn plan_transfer(
    manifest: &VideoManifest,
    stream_id: &str,
) -> Result<TransferPlan, StreamgrabError> {
    let selected = manifest
        .find_stream(stream_id)
        .ok_or_else(|| StreamgrabError::FormatNotFound(stream_id.to_string()))?;

    match (selected.has_video, selected.has_audio) {
        (true, true) | (false, true) => Ok(TransferPlan::Direct {
            stream: selected.clone(),
        }),
        (true, false) => {
            let audio = select_audio_companion(&manifest.streams)?;
            Ok(TransferPlan::Mux {
                video: selected.clone(),
                audio: audio.clone(),
            })
        }
        (false, false) => Err(StreamgrabError::UnsupportedSelection(format!(
            "stream {} carries neither video nor audio",
            stream_id
        ))),
    }
}

/// Download filename derived from a video title.
///
/// Runs of characters outside `[A-Za-z0-9_]` collapse to one underscore and
/// edge underscores are trimmed.
pub fn output_filename(title: &str, extension: &str) -> String {
    let mut sanitized = String::with_capacity(title.len());
    let mut pending_separator = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_separator && !sanitized.is_empty() {
                sanitized.push('_');
            }
            pending_separator = false;
            sanitized.push(c);
        } else {
            pending_separator = true;
        }
    }

    let stem = sanitized.trim_matches('_');
    let stem = if stem.is_empty() { FALLBACK_FILENAME } else { stem };
    format!("{}.{}", stem, extension)
}
