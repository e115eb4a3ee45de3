//! Classifies a raw stream list into display-ready video and audio formats

use crate::extractor::models::{Container, StreamDescriptor};
use crate::formats::labels::{bitrate_label, size_label};
use serde::Serialize;
use std::collections::HashSet;

/// A format offered in the video list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFormat {
    pub id: String,
    pub quality: String,
    pub container: Container,
    pub size: String,
    pub has_audio: bool,
    pub has_video: bool,
}

/// A format offered in the audio list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    pub id: String,
    pub quality: String,
    pub container: Container,
    pub size: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedFormats {
    pub video: Vec<VideoFormat>,
    pub audio: Vec<AudioFormat>,
}

/// Collapse entries sharing an id to their first occurrence, keeping order
pub fn dedup_by_id<'a, I>(streams: I) -> Vec<&'a StreamDescriptor>
where
    I: IntoIterator<Item = &'a StreamDescriptor>,
{
    let mut seen = HashSet::new();
    streams
        .into_iter()
        .filter(|s| seen.insert(s.id.clone()))
        .collect()
}

/// Audio-only streams, restricted to the preferred container when any exist
pub fn audio_only_streams(streams: &[StreamDescriptor]) -> Vec<&StreamDescriptor> {
    let audio = dedup_by_id(streams.iter().filter(|s| s.is_audio_only()));

    if audio.iter().any(|s| s.container.is_preferred_audio()) {
        audio
            .into_iter()
            .filter(|s| s.container.is_preferred_audio())
            .collect()
    } else {
        audio
    }
}

fn video_quality(stream: &StreamDescriptor) -> String {
    stream
        .quality_label
        .clone()
        .or_else(|| stream.quality_tier.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Build the video and audio lists shown to the client
pub fn normalize_formats(streams: &[StreamDescriptor]) -> NormalizedFormats {
    let video = dedup_by_id(streams.iter().filter(|s| s.has_video))
        .into_iter()
        .map(|s| VideoFormat {
            id: s.id.clone(),
            quality: video_quality(s),
            container: s.container.clone(),
            size: size_label(s.approximate_size_bytes),
            has_audio: s.has_audio,
            has_video: s.has_video,
        })
        .collect();

    let audio = audio_only_streams(streams)
        .into_iter()
        .map(|s| AudioFormat {
            id: s.id.clone(),
            quality: bitrate_label(s.audio_bitrate_kbps),
            container: s.container.clone(),
            size: size_label(s.approximate_size_bytes),
        })
        .collect();

    NormalizedFormats { video, audio }
}
