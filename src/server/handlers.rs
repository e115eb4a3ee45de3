//! Request handlers

use super::AppState;
use crate::downloader::{output_filename, plan_transfer, ByteStream, TransferPlan};
use crate::extractor::{validate_url, VideoManifest};
use crate::formats::{
    description_excerpt, duration_label, normalize_formats, views_label, NormalizedFormats,
};
use crate::utils::StreamgrabError;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct MetadataRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub stream_id: String,
}

/// Display-ready video information
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    pub title: String,
    pub description_excerpt: String,
    pub thumbnail_url: Option<String>,
    pub duration_label: String,
    pub views_label: String,
    pub channel_name: String,
    pub upload_date: String,
    pub formats: NormalizedFormats,
}

impl MetadataResponse {
    pub fn from_manifest(manifest: &VideoManifest) -> Self {
        Self {
            title: manifest.title.clone(),
            description_excerpt: description_excerpt(manifest.description.as_deref()),
            thumbnail_url: manifest.thumbnail_url.clone(),
            duration_label: duration_label(manifest.duration_seconds),
            views_label: views_label(manifest.view_count),
            channel_name: or_unknown(manifest.channel_name.as_deref()),
            upload_date: or_unknown(manifest.upload_date.as_deref()),
            formats: normalize_formats(&manifest.streams),
        }
    }
}

fn or_unknown(value: Option<&str>) -> String {
    value.unwrap_or("Unknown").to_string()
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn metadata(
    State(state): State<AppState>,
    payload: Result<Json<MetadataRequest>, JsonRejection>,
) -> Result<Json<MetadataResponse>, StreamgrabError> {
    let Json(request) = payload.map_err(rejected)?;
    let manifest = resolve(&state, &request.url).await?;
    let response = MetadataResponse::from_manifest(&manifest);

    info!(
        "Resolved \"{}\": {} video and {} audio formats",
        response.title,
        response.formats.video.len(),
        response.formats.audio.len()
    );
    Ok(Json(response))
}

pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, StreamgrabError> {
    let Json(request) = payload.map_err(rejected)?;
    let request_id = Uuid::new_v4();
    let span = info_span!("download", %request_id, stream_id = %request.stream_id);

    async move {
        let manifest = resolve(&state, &request.url).await?;
        let plan = plan_transfer(&manifest, &request.stream_id)?;
        let filename = output_filename(&manifest.title, &plan.extension());
        let content_type = plan.content_type();
        let cancel = state.shutdown.child_token();

        let bytes: ByteStream = match plan {
            TransferPlan::Direct { stream } => {
                info!("Relaying stream {} as {}", stream.id, filename);
                state.fetcher.open(&stream).await.map_err(open_error)?
            }
            TransferPlan::Mux { video, audio } => {
                info!(
                    "Muxing video {} with audio {} as {}",
                    video.id, audio.id, filename
                );
                let (video, audio) =
                    tokio::try_join!(state.fetcher.open(&video), state.fetcher.open(&audio))
                        .map_err(open_error)?;
                let output = state.muxer.mux(video, audio, cancel.clone()).await?;
                Box::pin(output)
            }
        };

        let body = until_cancelled(bytes, cancel).inspect_err(move |e| {
            error!(%request_id, "Transfer failed after the response was committed: {}", e)
        });

        Ok((
            [
                (CONTENT_TYPE, content_type),
                (
                    CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            Body::from_stream(body),
        )
            .into_response())
    }
    .instrument(span)
    .await
}

/// Validate a URL and resolve its manifest
async fn resolve(state: &AppState, url: &str) -> Result<VideoManifest, StreamgrabError> {
    let canonical = validate_url(url)?;
    if !state.extractor.supports(&canonical) {
        return Err(StreamgrabError::InvalidUrl(url.to_string()));
    }

    state
        .extractor
        .extract_info(&canonical)
        .await
        .map_err(|e| match e.downcast::<StreamgrabError>() {
            Ok(err) => err,
            Err(e) => StreamgrabError::ResolutionFailed(e.to_string()),
        })
}

/// Malformed bodies get the same JSON error shape as every other failure
fn rejected(rejection: JsonRejection) -> StreamgrabError {
    StreamgrabError::InvalidRequest(rejection.body_text())
}

fn open_error(e: anyhow::Error) -> StreamgrabError {
    StreamgrabError::ResolutionFailed(format!("failed to open stream: {}", e))
}

/// End a body with an error once the transfer is cancelled, so the client sees
/// an aborted connection rather than a short but complete-looking file
fn until_cancelled(bytes: ByteStream, cancel: CancellationToken) -> ByteStream {
    let token = cancel.clone();
    let tail = stream::once(async move { token.is_cancelled() }).filter_map(|cancelled| async move {
        cancelled.then(|| Err::<Bytes, io::Error>(io::Error::other("transfer cancelled")))
    });

    Box::pin(bytes.take_until(cancel.cancelled_owned()).chain(tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::models::Container;
    use crate::formats::normalizer::tests::stream as descriptor;

    #[test]
    fn test_metadata_response_shape() {
        let manifest = VideoManifest {
            title: "Demo".to_string(),
            description: None,
            thumbnail_url: Some("https://img.example/t.jpg".to_string()),
            duration_seconds: 125,
            view_count: 1_500,
            channel_name: Some("Channel".to_string()),
            upload_date: Some("2024-01-31".to_string()),
            streams: vec![
                descriptor("137", Container::Mp4, true, false, None),
                descriptor("140", Container::M4a, false, true, Some(128)),
            ],
        };

        let json = serde_json::to_value(MetadataResponse::from_manifest(&manifest)).unwrap();
        assert_eq!(json["durationLabel"], "2:05");
        assert_eq!(json["viewsLabel"], "1.5K views");
        assert_eq!(json["descriptionExcerpt"], "No description available");
        assert_eq!(json["uploadDate"], "2024-01-31");
        assert_eq!(json["channelName"], "Channel");
        assert_eq!(json["formats"]["video"][0]["id"], "137");
        assert_eq!(json["formats"]["audio"][0]["quality"], "128kbps");
    }

    #[test]
    fn test_metadata_response_fills_unknown_fields() {
        let manifest = VideoManifest {
            title: "Demo".to_string(),
            description: None,
            thumbnail_url: None,
            duration_seconds: 45,
            view_count: 0,
            channel_name: None,
            upload_date: None,
            streams: vec![],
        };

        let json = serde_json::to_value(MetadataResponse::from_manifest(&manifest)).unwrap();
        assert_eq!(json["channelName"], "Unknown");
        assert_eq!(json["uploadDate"], "Unknown");
    }

    #[test]
    fn test_download_request_uses_camel_case() {
        let request: DownloadRequest =
            serde_json::from_str(r#"{"url":"u","streamId":"137"}"#).unwrap();
        assert_eq!(request.stream_id, "137");
    }

    #[tokio::test]
    async fn test_until_cancelled_passes_complete_stream() {
        let bytes: ByteStream = Box::pin(stream::iter(vec![
            Ok::<_, io::Error>(Bytes::from_static(b"a")),
            Ok(Bytes::from_static(b"b")),
        ]));
        let items: Vec<_> = until_cancelled(bytes, CancellationToken::new())
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.is_ok()));
    }

    #[tokio::test]
    async fn test_until_cancelled_errors_on_cancel() {
        let cancel = CancellationToken::new();
        let bytes: ByteStream = Box::pin(
            stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"a"))])
                .chain(stream::pending()),
        );
        let mut body = until_cancelled(bytes, cancel.clone());

        assert!(body.next().await.unwrap().is_ok());
        cancel.cancel();
        assert!(body.next().await.unwrap().is_err());
        assert!(body.next().await.is_none());
    }
}
