//! Byte streams for resolved stream descriptors
//!
//! The platform throttles long-lived unranged reads, so streams are fetched as
//! a sequence of `Range` requests, one in flight at a time. Each chunk's body
//! is itself streamed, so at most one network read is buffered.

use crate::extractor::models::StreamDescriptor;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// A remote media stream, pulled on demand
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Opens byte streams for stream descriptors
#[async_trait]
pub trait StreamFetcher: Send + Sync {
    /// Open a stream. Errors returned here happen before any byte was
    /// produced; errors yielded by the stream happen mid-transfer.
    async fn open(&self, stream: &StreamDescriptor) -> Result<ByteStream>;
}

/// Fetcher configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Size of each ranged request; `None` disables ranged fetching
    pub range_chunk_size: Option<u64>,
    pub connect_timeout: Duration,
    /// Maximum idle time between two reads of a response body
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            range_chunk_size: Some(10 * 1024 * 1024), // 10MB
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
        }
    }
}

/// Fetches streams over HTTP(S) with reqwest
pub struct HttpStreamFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpStreamFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        // No overall timeout: a transfer legitimately lasts as long as the client reads.
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl StreamFetcher for HttpStreamFetcher {
    async fn open(&self, stream: &StreamDescriptor) -> Result<ByteStream> {
        let headers = header_map(stream);
        let url = stream.url.clone();

        let Some(chunk_size) = self.config.range_chunk_size.filter(|c| *c > 0) else {
            debug!("Fetching stream {} without ranges", stream.id);
            let response = self.client.get(&url).headers(headers).send().await?;
            if !response.status().is_success() {
                return Err(anyhow::anyhow!("HTTP error: {}", response.status()));
            }
            return Ok(body_stream(response));
        };

        debug!("Fetching stream {} in {} byte ranges", stream.id, chunk_size);
        let (first, next) = fetch_range(&self.client, &url, &headers, 0, chunk_size)
            .await?
            .ok_or_else(|| anyhow::anyhow!("stream {} is empty", stream.id))?;

        let client = self.client.clone();
        let rest = stream::try_unfold(next, move |next| {
            let client = client.clone();
            let url = url.clone();
            let headers = headers.clone();
            async move {
                match next {
                    Some(start) => fetch_range(&client, &url, &headers, start, chunk_size).await,
                    None => Ok(None),
                }
            }
        })
        .try_flatten();

        Ok(Box::pin(first.chain(rest)))
    }
}

fn header_map(stream: &StreamDescriptor) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &stream.http_headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Skipping invalid upstream header {}", name),
        }
    }
    headers
}

fn body_stream(response: reqwest::Response) -> ByteStream {
    Box::pin(response.bytes_stream().map_err(io::Error::other))
}

/// Fetch one range starting at `start`.
///
/// Returns the body and the offset of the following range, or `None` once the
/// server reports the range as unsatisfiable (past the end).
async fn fetch_range(
    client: &Client,
    url: &str,
    headers: &HeaderMap,
    start: u64,
    chunk_size: u64,
) -> io::Result<Option<(ByteStream, Option<u64>)>> {
    let end = start + chunk_size - 1;
    let response = client
        .get(url)
        .headers(headers.clone())
        .header(RANGE, format!("bytes={}-{}", start, end))
        .send()
        .await
        .map_err(io::Error::other)?;

    match response.status() {
        StatusCode::RANGE_NOT_SATISFIABLE if start > 0 => Ok(None),
        StatusCode::PARTIAL_CONTENT => {
            let next = next_offset(&response, start, chunk_size);
            Ok(Some((body_stream(response), next)))
        }
        // Server ignored the range and sent everything
        status if status.is_success() => Ok(Some((body_stream(response), None))),
        status => Err(io::Error::other(format!("HTTP error: {}", status))),
    }
}

/// Offset of the range after this response, if the resource continues
fn next_offset(response: &reqwest::Response, start: u64, chunk_size: u64) -> Option<u64> {
    let content_range = response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok());

    if let Some((range_end, total)) = content_range.and_then(parse_content_range) {
        return match total {
            Some(total) if range_end + 1 >= total => None,
            _ => Some(range_end + 1),
        };
    }

    // Without a usable Content-Range, a short body marks the end
    match response.content_length() {
        Some(len) if len >= chunk_size => Some(start + len),
        _ => None,
    }
}

/// Parse `bytes <start>-<end>/<total|*>` into `(end, total)`
fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let spec = value.trim().strip_prefix("bytes ")?;
    let (range, total) = spec.split_once('/')?;
    let (_, end) = range.split_once('-')?;
    let end = end.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((end, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range() {
        assert_eq!(
            parse_content_range("bytes 0-1023/4096"),
            Some((1023, Some(4096)))
        );
        assert_eq!(parse_content_range("bytes 1024-2047/*"), Some((2047, None)));
        assert_eq!(parse_content_range("bytes */4096"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
    }

    #[test]
    fn test_header_map_skips_invalid() {
        let mut stream = crate::formats::normalizer::tests::stream(
            "140",
            crate::extractor::Container::M4a,
            false,
            true,
            Some(128),
        );
        stream
            .http_headers
            .insert("User-Agent".into(), "Mozilla/5.0".into());
        stream
            .http_headers
            .insert("Bad Header".into(), "value".into());

        let headers = header_map(&stream);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["user-agent"], "Mozilla/5.0");
    }

    #[test]
    fn test_default_config() {
        let config = FetchConfig::default();
        assert!(config.range_chunk_size.unwrap_or(0) > 0);
        assert!(!config.user_agent.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_before_streaming() {
        let fetcher = HttpStreamFetcher::new(FetchConfig {
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap();
        let mut stream = crate::formats::normalizer::tests::stream(
            "18",
            crate::extractor::Container::Mp4,
            true,
            true,
            None,
        );
        // Port 9 (discard) on loopback is closed on any sane test host
        stream.url = "http://127.0.0.1:9/video.mp4".to_string();

        assert!(fetcher.open(&stream).await.is_err());
    }
}
