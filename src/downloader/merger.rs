//! Video/audio stream merger
//!
//! Combines a video-only and an audio-only byte stream into one fragmented MP4
//! with an external ffmpeg process, without touching the disk:
//!
//! ```text
//! video fetch --> ffmpeg stdin (pipe:0) -\
//!                                         ffmpeg --> stdout --> response body
//! audio fetch --> loopback tcp socket ---/
//! ```
//!
//! Every stage is a bounded pipe, so a slow client stalls ffmpeg, which stalls
//! both fetches. One cancellation token per request tears the whole pipeline
//! down when the response body is dropped.

use crate::downloader::fetcher::ByteStream;
use crate::extractor::models::StreamDescriptor;
use crate::utils::error::StreamgrabError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::ready;
use futures::stream::{self, Stream, StreamExt};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::process::{Child, ChildStderr, Command as AsyncCommand};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::io::{ReaderStream, StreamReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pick the audio stream to pair with a video-only selection.
///
/// Prefers the m4a family and the highest bitrate within it (first wins on
/// ties); without any m4a stream, the first audio-only stream in manifest order.
pub fn select_audio_companion(
    streams: &[StreamDescriptor],
) -> Result<&StreamDescriptor, StreamgrabError> {
    let best_preferred = streams
        .iter()
        .filter(|s| s.is_audio_only() && s.container.is_preferred_audio())
        .fold(None::<&StreamDescriptor>, |best, candidate| match best {
            Some(current)
                if current.audio_bitrate_kbps.unwrap_or(0)
                    >= candidate.audio_bitrate_kbps.unwrap_or(0) =>
            {
                Some(current)
            }
            _ => Some(candidate),
        });

    best_preferred
        .or_else(|| streams.iter().find(|s| s.is_audio_only()))
        .ok_or(StreamgrabError::NoAudioStreamFound)
}

/// Muxes a video-only and an audio-only stream into one container
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Start muxing. Returns once the first output bytes are available, so a
    /// failure reported here happened before anything reached the client.
    /// Cancelling `cancel` tears the pipeline down at any point.
    async fn mux(
        &self,
        video: ByteStream,
        audio: ByteStream,
        cancel: CancellationToken,
    ) -> Result<MuxOutput, StreamgrabError>;
}

/// Shared by the feeders, the supervisor and the commit check in `mux`
#[derive(Debug, Default)]
struct PipelineState {
    /// Set once the first output bytes were handed out
    committed: AtomicBool,
    /// First failure seen by a feeder; later ones are dropped
    failure: Mutex<Option<String>>,
}

impl PipelineState {
    fn record_failure(&self, message: String) {
        if let Ok(mut slot) = self.failure.lock() {
            slot.get_or_insert(message);
        }
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|slot| slot.clone())
    }
}

/// How a mux run ended, reported by the supervisor
#[derive(Debug)]
struct PipelineExit {
    status: Option<ExitStatus>,
    /// `None` only when ffmpeg finished cleanly and every input was fed in full
    failure: Option<String>,
}

/// Tears down a running pipeline when the output is dropped
struct PipelineGuard {
    cancel: CancellationToken,
    /// Cancelled once ffmpeg's stdout reached end of file
    output_ended: CancellationToken,
}

impl Drop for PipelineGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The muxed byte stream handed to the response body.
///
/// After ffmpeg's stdout ends, the stream waits for the supervisor's verdict
/// and yields one final error if the mux did not complete, so a truncated
/// file never looks like a finished download.
pub struct MuxOutput {
    stream: ByteStream,
    stream_done: bool,
    guard: Option<PipelineGuard>,
    exit: Option<oneshot::Receiver<PipelineExit>>,
    pid: Option<u32>,
}

impl MuxOutput {
    /// Wrap an already-muxed stream that needs no process supervision
    pub fn from_stream(stream: ByteStream) -> Self {
        Self {
            stream,
            stream_done: false,
            guard: None,
            exit: None,
            pid: None,
        }
    }

    /// OS process id of the muxer, when one is running
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Stream for MuxOutput {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if !this.stream_done {
            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(item) => return Poll::Ready(Some(item)),
                None => {
                    this.stream_done = true;
                    if let Some(guard) = &this.guard {
                        guard.output_ended.cancel();
                    }
                }
            }
        }

        let Some(exit) = this.exit.as_mut() else {
            return Poll::Ready(None);
        };
        let verdict = ready!(Pin::new(exit).poll(cx));
        this.exit = None;

        Poll::Ready(match verdict {
            Ok(PipelineExit { failure: None, .. }) => None,
            Ok(PipelineExit {
                failure: Some(reason),
                ..
            }) => Some(Err(io::Error::other(reason))),
            Err(_) => Some(Err(io::Error::other(
                "mux supervisor stopped without reporting",
            ))),
        })
    }
}

/// ffmpeg muxer configuration
#[derive(Debug, Clone)]
pub struct MuxConfig {
    pub ffmpeg_path: PathBuf,
    /// Read size for ffmpeg's stdout; bounds per-request read-ahead
    pub chunk_size: usize,
    /// How long ffmpeg may take to produce its first output bytes
    pub first_output_timeout: Duration,
    /// How long ffmpeg may take to connect to the audio socket
    pub accept_timeout: Duration,
    /// How long ffmpeg may linger after its output ended before it is killed
    pub finish_grace: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            chunk_size: 64 * 1024,
            first_output_timeout: Duration::from_secs(60),
            accept_timeout: Duration::from_secs(30),
            finish_grace: Duration::from_secs(5),
        }
    }
}

impl MuxConfig {
    /// Arguments for one mux run reading audio from `audio_port`
    pub fn build_ffmpeg_args(&self, audio_port: u16) -> Vec<String> {
        let audio_input = format!("tcp://127.0.0.1:{}", audio_port);
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            "pipe:0",
            "-i",
            audio_input.as_str(),
            "-map",
            "0:v",
            "-map",
            "1:a",
            "-c",
            "copy",
            "-f",
            "mp4",
            "-movflags",
            "frag_keyframe+empty_moov",
            "pipe:1",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
    }
}

/// Muxer backed by one ffmpeg process per request
pub struct FfmpegMuxer {
    config: MuxConfig,
}

impl FfmpegMuxer {
    pub fn new(config: MuxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn mux(
        &self,
        video: ByteStream,
        audio: ByteStream,
        cancel: CancellationToken,
    ) -> Result<MuxOutput, StreamgrabError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let audio_port = listener.local_addr()?.port();

        let mut cmd = AsyncCommand::new(&self.config.ffmpeg_path);
        cmd.args(self.config.build_ffmpeg_args(audio_port))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!("Starting ffmpeg mux process");
        debug!("ffmpeg command: {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| StreamgrabError::MergeFailed(format!("failed to spawn ffmpeg: {}", e)))?;
        let pid = child.id();

        let (stdin, stdout, stderr) = match (
            child.stdin.take(),
            child.stdout.take(),
            child.stderr.take(),
        ) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                kill_child(&mut child).await;
                return Err(StreamgrabError::MergeFailed(
                    "ffmpeg pipes unavailable".to_string(),
                ));
            }
        };

        let state = Arc::new(PipelineState::default());

        let video_feeder = tokio::spawn(feed_until_cancelled(
            "video",
            video,
            stdin,
            cancel.clone(),
            Arc::clone(&state),
        ));
        let audio_feeder = tokio::spawn(feed_audio_socket(
            listener,
            audio,
            self.config.accept_timeout,
            cancel.clone(),
            Arc::clone(&state),
        ));
        let stderr_tail = tokio::spawn(log_stderr(stderr));

        let output_ended = CancellationToken::new();
        let (exit_tx, mut exit_rx) = oneshot::channel();

        tokio::spawn(supervise(
            child,
            Supervision {
                cancel: cancel.clone(),
                output_ended: output_ended.clone(),
                state: Arc::clone(&state),
                finish_grace: self.config.finish_grace,
                feeders: [video_feeder, audio_feeder],
                stderr_tail,
                exit_tx,
            },
        ));

        let guard = PipelineGuard {
            cancel: cancel.clone(),
            output_ended,
        };

        let mut output = ReaderStream::with_capacity(stdout, self.config.chunk_size);
        let first = tokio::time::timeout(self.config.first_output_timeout, output.next()).await;

        let failure = match first {
            Ok(Some(Ok(chunk))) => {
                state.committed.store(true, Ordering::SeqCst);
                debug!("ffmpeg produced first {} bytes", chunk.len());
                let stream = stream::once(async move { Ok(chunk) }).chain(output);
                return Ok(MuxOutput {
                    stream: Box::pin(stream),
                    stream_done: false,
                    guard: Some(guard),
                    exit: Some(exit_rx),
                    pid,
                });
            }
            Ok(Some(Err(e))) => format!("failed to read ffmpeg output: {}", e),
            Ok(None) => {
                guard.output_ended.cancel();
                let verdict = tokio::time::timeout(
                    self.config.finish_grace + Duration::from_secs(2),
                    &mut exit_rx,
                )
                .await
                .ok()
                .and_then(Result::ok);
                match verdict {
                    Some(PipelineExit {
                        failure: Some(reason),
                        ..
                    }) => format!("ffmpeg failed before producing output: {}", reason),
                    Some(PipelineExit {
                        status: Some(status),
                        failure: None,
                    }) => format!("ffmpeg exited with {} without producing output", status),
                    _ => "ffmpeg produced no output".to_string(),
                }
            }
            Err(_) => format!(
                "ffmpeg produced no output within {}s",
                self.config.first_output_timeout.as_secs()
            ),
        };

        // Dropping the guard cancels the pipeline and kills ffmpeg
        drop(guard);
        Err(StreamgrabError::MergeFailed(failure))
    }
}

struct Supervision {
    cancel: CancellationToken,
    output_ended: CancellationToken,
    state: Arc<PipelineState>,
    finish_grace: Duration,
    feeders: [JoinHandle<()>; 2],
    stderr_tail: JoinHandle<String>,
    exit_tx: oneshot::Sender<PipelineExit>,
}

enum Ending {
    Exited,
    /// Output ended but ffmpeg had to be killed after the grace period
    Lingered,
    Killed,
}

/// Owns the ffmpeg process until it exits or the request is torn down
async fn supervise(mut child: Child, sup: Supervision) {
    enum Trigger {
        Exited(io::Result<ExitStatus>),
        OutputEnded,
        Cancelled,
    }

    let trigger = tokio::select! {
        biased;
        status = child.wait() => Trigger::Exited(status),
        _ = sup.output_ended.cancelled() => Trigger::OutputEnded,
        _ = sup.cancel.cancelled() => Trigger::Cancelled,
    };
    let committed = sup.state.committed.load(Ordering::SeqCst);

    let (status, ending) = match trigger {
        Trigger::Exited(status) => (status.ok(), Ending::Exited),
        Trigger::OutputEnded => {
            // Output is complete; give ffmpeg a moment to exit on its own
            match tokio::time::timeout(sup.finish_grace, child.wait()).await {
                Ok(status) => (status.ok(), Ending::Exited),
                Err(_) => {
                    warn!("ffmpeg still running after its output ended, killing it");
                    (kill_child(&mut child).await, Ending::Lingered)
                }
            }
        }
        Trigger::Cancelled => {
            if committed {
                warn!(
                    "{}",
                    StreamgrabError::TransferAborted(
                        "response closed before the mux finished".to_string()
                    )
                );
            }
            (kill_child(&mut child).await, Ending::Killed)
        }
    };

    for feeder in &sup.feeders {
        feeder.abort();
    }

    let tail = tokio::time::timeout(Duration::from_secs(1), sup.stderr_tail)
        .await
        .ok()
        .and_then(Result::ok)
        .unwrap_or_default();

    let recorded = sup.state.failure();
    let failure = match (status, &ending) {
        (Some(status), Ending::Exited) if status.success() => recorded,
        (_, Ending::Lingered) => recorded,
        (Some(status), Ending::Exited) => {
            Some(recorded.unwrap_or_else(|| describe_exit(status, &tail)))
        }
        (None, Ending::Exited) => {
            Some(recorded.unwrap_or_else(|| "ffmpeg exit status unavailable".to_string()))
        }
        (_, Ending::Killed) => {
            Some(recorded.unwrap_or_else(|| "ffmpeg was terminated".to_string()))
        }
    };

    let committed = sup.state.committed.load(Ordering::SeqCst);
    match &failure {
        None => info!("ffmpeg finished successfully"),
        Some(reason) if matches!(ending, Ending::Killed) => debug!("{}", reason),
        Some(reason) if committed => {
            error!("Muxed download is truncated: {}", reason)
        }
        Some(reason) => debug!("ffmpeg failed before producing output: {}", reason),
    }

    let _ = sup.exit_tx.send(PipelineExit { status, failure });
}

fn describe_exit(status: ExitStatus, stderr_tail: &str) -> String {
    if stderr_tail.is_empty() {
        format!("ffmpeg exited with {}", status)
    } else {
        format!("ffmpeg exited with {}: {}", status, stderr_tail)
    }
}

async fn kill_child(child: &mut Child) -> Option<ExitStatus> {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill ffmpeg: {}", e);
    }
    child.try_wait().ok().flatten()
}

/// Copy a byte stream into a pipe, closing the pipe at the end of input
async fn feed<W>(input: ByteStream, sink: &mut W) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut reader = StreamReader::new(input);
    let copied = tokio::io::copy(&mut reader, sink).await?;
    sink.shutdown().await?;
    Ok(copied)
}

/// ffmpeg went away before reading all of its input
fn peer_closed(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    )
}

async fn feed_until_cancelled<W>(
    label: &'static str,
    input: ByteStream,
    mut sink: W,
    cancel: CancellationToken,
    state: Arc<PipelineState>,
) where
    W: AsyncWrite + Unpin + Send,
{
    let result = tokio::select! {
        result = feed(input, &mut sink) => result,
        _ = cancel.cancelled() => {
            debug!("{} feed cancelled", label);
            return;
        }
    };

    match result {
        Ok(bytes) => debug!("Fed {} bytes of {} into ffmpeg", bytes, label),
        Err(e) if peer_closed(&e) => debug!("ffmpeg closed its {} input early", label),
        Err(e) => {
            error!("Feeding {} into ffmpeg failed: {}", label, e);
            // Recorded before the sink closes, so ffmpeg cannot finish first
            state.record_failure(format!("{} input failed: {}", label, e));
        }
    }
    drop(sink);
}

async fn feed_audio_socket(
    listener: TcpListener,
    audio: ByteStream,
    accept_timeout: Duration,
    cancel: CancellationToken,
    state: Arc<PipelineState>,
) {
    let accepted = tokio::select! {
        accepted = tokio::time::timeout(accept_timeout, listener.accept()) => accepted,
        _ = cancel.cancelled() => {
            debug!("audio feed cancelled before ffmpeg connected");
            return;
        }
    };

    let socket = match accepted {
        Ok(Ok((socket, peer))) => {
            debug!("ffmpeg connected for audio from {}", peer);
            socket
        }
        Ok(Err(e)) => {
            error!("Accepting ffmpeg audio connection failed: {}", e);
            state.record_failure(format!("audio connection failed: {}", e));
            return;
        }
        Err(_) => {
            error!(
                "ffmpeg did not connect for audio within {}s",
                accept_timeout.as_secs()
            );
            state.record_failure(format!(
                "ffmpeg did not connect for audio within {}s",
                accept_timeout.as_secs()
            ));
            return;
        }
    };
    drop(listener);

    feed_until_cancelled("audio", audio, socket, cancel, state).await;
}

/// Forward ffmpeg's stderr to the log, returning its last line
async fn log_stderr(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut last = String::new();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    debug!("ffmpeg: {}", line);
                    last = line.to_string();
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading ffmpeg stderr: {}", e);
                break;
            }
        }
    }
    last
}
