//! Data structures for video manifests
//!
//! yt-dlp's JSON is deserialized into the private `Raw*` structs and converted
//! into [`VideoManifest`] in [`VideoManifest::from_raw`]. Nothing outside this
//! module sees yt-dlp's field names.

use crate::utils::error::StreamgrabError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Media container of a single encoded stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Container {
    Mp4,
    M4a,
    Webm,
    Mp3,
    Ogg,
    ThreeGp,
    Flv,
    Other(String),
}

impl Container {
    /// Parse a yt-dlp `ext` value
    pub fn from_ext(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" => Container::Mp4,
            "m4a" => Container::M4a,
            "webm" => Container::Webm,
            "mp3" => Container::Mp3,
            "ogg" | "opus" => Container::Ogg,
            "3gp" => Container::ThreeGp,
            "flv" => Container::Flv,
            other => Container::Other(other.to_string()),
        }
    }

    /// File extension without the leading dot
    pub fn extension(&self) -> &str {
        match self {
            Container::Mp4 => "mp4",
            Container::M4a => "m4a",
            Container::Webm => "webm",
            Container::Mp3 => "mp3",
            Container::Ogg => "ogg",
            Container::ThreeGp => "3gp",
            Container::Flv => "flv",
            Container::Other(ext) => ext,
        }
    }

    /// MIME type for a stream in this container
    pub fn mime_type(&self, has_video: bool) -> String {
        match (self, has_video) {
            (Container::Mp4, true) => "video/mp4".to_string(),
            (Container::Mp4, false) | (Container::M4a, _) => "audio/mp4".to_string(),
            (Container::Webm, true) => "video/webm".to_string(),
            (Container::Webm, false) => "audio/webm".to_string(),
            (Container::Mp3, _) => "audio/mpeg".to_string(),
            (Container::Ogg, _) => "audio/ogg".to_string(),
            (Container::ThreeGp, _) => "video/3gpp".to_string(),
            (Container::Flv, _) => "video/x-flv".to_string(),
            (Container::Other(_), _) => "application/octet-stream".to_string(),
        }
    }

    /// The container family preferred for audio-only downloads
    pub fn is_preferred_audio(&self) -> bool {
        matches!(self, Container::M4a)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl Serialize for Container {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.extension())
    }
}

/// One encoded stream offered by the platform
///
/// Only meaningful relative to the manifest it was resolved with: ids are not
/// stable across time and the URL is short-lived.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub id: String,
    pub container: Container,
    pub has_video: bool,
    pub has_audio: bool,
    pub quality_label: Option<String>,
    pub quality_tier: Option<String>,
    pub audio_bitrate_kbps: Option<u32>,
    pub approximate_size_bytes: Option<u64>,
    pub mime_type: String,
    pub url: String,
    pub http_headers: BTreeMap<String, String>,
}

impl StreamDescriptor {
    /// Video track without audio
    pub fn is_video_only(&self) -> bool {
        self.has_video && !self.has_audio
    }

    /// Audio track without video
    pub fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }
}

/// Everything known about one source video, resolved for a single request
#[derive(Debug, Clone, PartialEq)]
pub struct VideoManifest {
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: u64,
    pub view_count: u64,
    pub channel_name: Option<String>,
    pub upload_date: Option<String>,
    pub streams: Vec<StreamDescriptor>,
}

impl VideoManifest {
    /// Find a stream by its id in this manifest
    pub fn find_stream(&self, id: &str) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.id == id)
    }

    /// Parse the output of `yt-dlp --dump-json`
    pub fn from_ytdlp_json(json: &str) -> Result<Self, StreamgrabError> {
        let raw: RawVideoInfo = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawVideoInfo) -> Result<Self, StreamgrabError> {
        let title = raw
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| StreamgrabError::ResolutionFailed("manifest has no title".into()))?;

        let thumbnail_url = raw
            .thumbnails
            .into_iter()
            .filter_map(|t| t.url)
            .last()
            .or(raw.thumbnail);

        let streams = raw
            .formats
            .into_iter()
            .filter_map(RawFormat::into_descriptor)
            .collect();

        Ok(Self {
            title,
            description: raw.description,
            thumbnail_url,
            duration_seconds: raw.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
            view_count: raw.view_count.unwrap_or(0),
            channel_name: raw.channel.or(raw.uploader),
            upload_date: raw.upload_date.map(|d| normalize_upload_date(&d)),
            streams,
        })
    }
}

/// Render yt-dlp's `YYYYMMDD` dates as `YYYY-MM-DD`; anything else passes through
fn normalize_upload_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

// ============================================================
// yt-dlp JSON shape
// ============================================================

#[derive(Debug, Deserialize)]
struct RawVideoInfo {
    title: Option<String>,
    description: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<RawThumbnail>,
    duration: Option<f64>,
    view_count: Option<u64>,
    channel: Option<String>,
    uploader: Option<String>,
    upload_date: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawThumbnail {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    ext: Option<String>,
    url: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    format_note: Option<String>,
    resolution: Option<String>,
    height: Option<u32>,
    abr: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
    audio_ext: Option<String>,
    #[serde(default)]
    http_headers: BTreeMap<String, String>,
}

fn codec_present(codec: &Option<String>) -> bool {
    codec
        .as_deref()
        .map(|c| !c.is_empty() && c != "none")
        .unwrap_or(false)
}

impl RawFormat {
    fn into_descriptor(self) -> Option<StreamDescriptor> {
        let id = self.format_id?;
        let ext = self.ext?;
        let url = self.url?;

        let has_video = codec_present(&self.vcodec);
        let has_audio = codec_present(&self.acodec);

        let mut container = Container::from_ext(&ext);
        if container == Container::Mp4
            && has_audio
            && !has_video
            && self.audio_ext.as_deref() == Some("m4a")
        {
            container = Container::M4a;
        }

        let quality_label = self
            .format_note
            .filter(|n| !n.is_empty())
            .or_else(|| self.height.map(|h| format!("{}p", h)));

        Some(StreamDescriptor {
            mime_type: container.mime_type(has_video),
            id,
            container,
            has_video,
            has_audio,
            quality_label,
            quality_tier: self.resolution,
            audio_bitrate_kbps: self.abr.filter(|b| *b > 0.0).map(|b| b.round() as u32),
            approximate_size_bytes: self.filesize.or(self.filesize_approx),
            url,
            http_headers: self.http_headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": "dQw4w9WgXcQ",
        "title": "Cool Video! #1",
        "description": "A description",
        "thumbnail": "https://i.example/fallback.jpg",
        "thumbnails": [
            {"url": "https://i.example/small.jpg"},
            {"url": "https://i.example/large.jpg"}
        ],
        "duration": 212.0,
        "view_count": 1500,
        "uploader": "Uploader",
        "channel": "Channel",
        "upload_date": "20240115",
        "formats": [
            {"format_id": "sb0", "ext": "mhtml", "url": "https://s.example/sb",
             "vcodec": "none", "acodec": "none", "format_note": "storyboard"},
            {"format_id": "140", "ext": "m4a", "url": "https://s.example/140",
             "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5,
             "format_note": "medium", "filesize": 3433000, "audio_ext": "m4a",
             "http_headers": {"User-Agent": "Mozilla/5.0"}},
            {"format_id": "137", "ext": "mp4", "url": "https://s.example/137",
             "vcodec": "avc1.640028", "acodec": "none", "height": 1080,
             "resolution": "1920x1080", "filesize_approx": 52428800},
            {"format_id": "18", "ext": "mp4", "url": "https://s.example/18",
             "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "format_note": "360p"},
            {"format_id": "nourl", "ext": "mp4"}
        ]
    }"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = VideoManifest::from_ytdlp_json(SAMPLE).unwrap();

        assert_eq!(manifest.title, "Cool Video! #1");
        assert_eq!(manifest.duration_seconds, 212);
        assert_eq!(manifest.view_count, 1500);
        assert_eq!(manifest.channel_name.as_deref(), Some("Channel"));
        assert_eq!(manifest.upload_date.as_deref(), Some("2024-01-15"));
        assert_eq!(
            manifest.thumbnail_url.as_deref(),
            Some("https://i.example/large.jpg")
        );
        // The format without a URL is dropped at the boundary
        assert_eq!(manifest.streams.len(), 4);
    }

    #[test]
    fn test_stream_capabilities() {
        let manifest = VideoManifest::from_ytdlp_json(SAMPLE).unwrap();

        let storyboard = manifest.find_stream("sb0").unwrap();
        assert!(!storyboard.has_video && !storyboard.has_audio);

        let audio = manifest.find_stream("140").unwrap();
        assert!(audio.is_audio_only());
        assert_eq!(audio.container, Container::M4a);
        assert_eq!(audio.audio_bitrate_kbps, Some(130));
        assert_eq!(audio.mime_type, "audio/mp4");
        assert_eq!(
            audio.http_headers.get("User-Agent").map(String::as_str),
            Some("Mozilla/5.0")
        );

        let video = manifest.find_stream("137").unwrap();
        assert!(video.is_video_only());
        assert_eq!(video.quality_label.as_deref(), Some("1080p"));
        assert_eq!(video.quality_tier.as_deref(), Some("1920x1080"));
        assert_eq!(video.approximate_size_bytes, Some(52_428_800));

        let muxed = manifest.find_stream("18").unwrap();
        assert!(muxed.has_video && muxed.has_audio);
        assert_eq!(muxed.mime_type, "video/mp4");
    }

    #[test]
    fn test_missing_title_is_rejected() {
        let result = VideoManifest::from_ytdlp_json(r#"{"formats": []}"#);
        assert!(matches!(result, Err(StreamgrabError::ResolutionFailed(_))));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let result = VideoManifest::from_ytdlp_json("not json");
        assert!(matches!(result, Err(StreamgrabError::SerializationError(_))));
    }

    #[test]
    fn test_upload_date_passthrough() {
        assert_eq!(normalize_upload_date("20231231"), "2023-12-31");
        assert_eq!(normalize_upload_date("yesterday"), "yesterday");
    }

    #[test]
    fn test_container_from_ext() {
        assert_eq!(Container::from_ext("WEBM"), Container::Webm);
        assert_eq!(Container::from_ext("mkv"), Container::Other("mkv".into()));
        assert_eq!(Container::Other("mkv".into()).extension(), "mkv");
        assert!(Container::M4a.is_preferred_audio());
        assert!(!Container::Webm.is_preferred_audio());
    }
}
