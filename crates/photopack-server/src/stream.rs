//! Chunked delivery of archiver output.
//!
//! [`archive_channel`] pairs a [`ChunkSender`] with an [`ArchiveBody`] that
//! hyper streams to the client. The channel holds a single chunk, and
//! [`ChunkPump::pump`] reserves that slot *before* reading from the archiver,
//! so a slow client stalls the read loop instead of growing a buffer.
//!
//! The body only ends cleanly after [`ChunkSender::finish`]. If the sender is
//! dropped without it (failure, shutdown, a panicking task) the body yields
//! an error and hyper closes the connection without the final chunk, so the
//! client sees a truncated download rather than a short but valid one.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use hyper::body::{Body, Frame, SizeHint};
use photopack_config::{StreamingSection, DEFAULT_CHUNK_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use crate::error::{ArchiveError, ArchiveResult, InterruptReason};
use crate::shutdown::ShutdownSignal;

type Chunk = io::Result<Bytes>;

/// Creates a connected sender and response body.
#[must_use]
pub fn archive_channel() -> (ChunkSender, ArchiveBody) {
    let (tx, rx) = mpsc::channel(1);
    let complete = Arc::new(AtomicBool::new(false));

    let sender = ChunkSender {
        tx,
        complete: Arc::clone(&complete),
    };
    let body = ArchiveBody { rx, complete };
    (sender, body)
}

/// Producer half of an archive body.
#[derive(Debug)]
pub struct ChunkSender {
    tx: mpsc::Sender<Chunk>,
    complete: Arc<AtomicBool>,
}

impl ChunkSender {
    /// Marks the stream complete and closes it.
    pub fn finish(self) {
        self.complete.store(true, Ordering::Release);
    }
}

/// Streaming response body fed by a [`ChunkSender`].
///
/// Has no known length, so hyper sends it with `Transfer-Encoding: chunked`.
#[derive(Debug)]
pub struct ArchiveBody {
    rx: mpsc::Receiver<Chunk>,
    complete: Arc<AtomicBool>,
}

impl Body for ArchiveBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(chunk.map(Frame::data))),
            Poll::Ready(None) if self.complete.load(Ordering::Acquire) => Poll::Ready(None),
            Poll::Ready(None) => Poll::Ready(Some(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive transfer aborted",
            )))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

/// Bytes and chunks delivered by one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// Total bytes forwarded.
    pub bytes: u64,
    /// Number of chunks forwarded.
    pub chunks: u64,
}

/// Copies a reader into a [`ChunkSender`] in bounded, optionally paced chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPump {
    chunk_size: usize,
    pacing: Option<Duration>,
}

impl ChunkPump {
    /// Creates a pump reading at most `chunk_size` bytes per chunk.
    ///
    /// A zero size is raised to one byte.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            pacing: None,
        }
    }

    /// Sleeps for `interval` after every chunk. `None` disables pacing.
    #[must_use]
    pub fn with_pacing(mut self, interval: Option<Duration>) -> Self {
        self.pacing = interval;
        self
    }

    /// Maximum chunk size in bytes.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Pause after each chunk, if pacing is on.
    #[must_use]
    pub fn pacing(&self) -> Option<Duration> {
        self.pacing
    }

    /// Forwards `reader` to `sender` until end-of-stream.
    ///
    /// Each iteration waits for room in the body, reads up to
    /// [`chunk_size`](Self::chunk_size) bytes, hands them over, then sleeps for
    /// the pacing interval. Every wait also watches for the body being dropped
    /// and for `shutdown`.
    ///
    /// Does not call [`ChunkSender::finish`]; the caller decides once cleanup
    /// has run.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::Interrupted`] if the client went away or shutdown was
    ///   triggered.
    /// - [`ArchiveError::Stream`] if reading failed.
    pub async fn pump<R>(
        &self,
        mut reader: R,
        sender: &ChunkSender,
        shutdown: &ShutdownSignal,
    ) -> ArchiveResult<TransferSummary>
    where
        R: AsyncRead + Unpin,
    {
        let tx = &sender.tx;
        let mut buf = vec![0u8; self.chunk_size];
        let mut summary = TransferSummary::default();

        loop {
            let permit = tokio::select! {
                permit = tx.reserve() => permit.map_err(|_| disconnected())?,
                () = shutdown.triggered() => return Err(shutting_down()),
            };

            let read = tokio::select! {
                read = reader.read(&mut buf) => read,
                () = tx.closed() => return Err(disconnected()),
                () = shutdown.triggered() => return Err(shutting_down()),
            };

            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ArchiveError::Stream(e)),
            };

            permit.send(Ok(Bytes::copy_from_slice(&buf[..n])));
            summary.bytes += n as u64;
            summary.chunks += 1;
            tracing::info!(bytes = n, chunk = summary.chunks, "Sending archive chunk");

            if let Some(interval) = self.pacing {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    () = tx.closed() => return Err(disconnected()),
                    () = shutdown.triggered() => return Err(shutting_down()),
                }
            }
        }

        Ok(summary)
    }
}

impl Default for ChunkPump {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl From<&StreamingSection> for ChunkPump {
    fn from(section: &StreamingSection) -> Self {
        Self::new(section.chunk_size).with_pacing(section.pacing())
    }
}

fn disconnected() -> ArchiveError {
    ArchiveError::interrupted(InterruptReason::ClientDisconnected)
}

fn shutting_down() -> ArchiveError {
    ArchiveError::interrupted(InterruptReason::Shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tokio::time::Instant;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len as u32).flat_map(u32::to_be_bytes).collect()
    }

    async fn collect_frames(mut body: ArchiveBody) -> (Vec<Bytes>, Option<io::Error>) {
        let mut frames = Vec::new();
        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => frames.push(frame.into_data().unwrap()),
                Err(e) => return (frames, Some(e)),
            }
        }
        (frames, None)
    }

    #[tokio::test]
    async fn test_pump_preserves_order_and_chunk_bound() {
        let data = pattern(10_000);
        let (sender, body) = archive_channel();
        let collector = tokio::spawn(collect_frames(body));

        let pump = ChunkPump::new(4_096);
        let summary = pump
            .pump(&data[..], &sender, &ShutdownSignal::new())
            .await
            .unwrap();
        sender.finish();

        let (frames, error) = collector.await.unwrap();
        assert!(error.is_none());
        assert!(frames.iter().all(|f| f.len() <= 4_096));
        assert_eq!(frames.concat(), data);
        assert_eq!(summary.bytes, data.len() as u64);
        assert_eq!(summary.chunks, frames.len() as u64);
    }

    #[tokio::test]
    async fn test_pump_forwards_short_reads_as_separate_chunks() {
        let reader = tokio_test::io::Builder::new()
            .read(b"PK\x03\x04")
            .read(b"abc")
            .read(b"defgh")
            .build();

        let (sender, body) = archive_channel();
        let collector = tokio::spawn(collect_frames(body));

        let summary = ChunkPump::new(1_024)
            .pump(reader, &sender, &ShutdownSignal::new())
            .await
            .unwrap();
        sender.finish();

        let (frames, _) = collector.await.unwrap();
        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b"PK\x03\x04"),
                Bytes::from_static(b"abc"),
                Bytes::from_static(b"defgh"),
            ]
        );
        assert_eq!(summary.chunks, 3);
    }

    #[tokio::test]
    async fn test_pump_read_error_aborts_body() {
        let reader = tokio_test::io::Builder::new()
            .read(b"partial")
            .read_error(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
            .build();

        let (sender, body) = archive_channel();
        let collector = tokio::spawn(collect_frames(body));

        let err = ChunkPump::new(1_024)
            .pump(reader, &sender, &ShutdownSignal::new())
            .await
            .unwrap_err();
        drop(sender);

        assert!(matches!(err, ArchiveError::Stream(_)));
        let (frames, error) = collector.await.unwrap();
        assert_eq!(frames, vec![Bytes::from_static(b"partial")]);
        assert_eq!(error.unwrap().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_pump_stops_when_body_dropped() {
        let (sender, body) = archive_channel();
        drop(body);

        let (_writer, reader) = tokio::io::duplex(64);
        let err = ChunkPump::new(16)
            .pump(reader, &sender, &ShutdownSignal::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ArchiveError::Interrupted {
                reason: InterruptReason::ClientDisconnected
            }
        ));
    }

    #[tokio::test]
    async fn test_pump_cancels_pending_read_on_disconnect() {
        let (sender, body) = archive_channel();
        let (_writer, reader) = tokio::io::duplex(64);

        let pump = tokio::spawn(async move {
            ChunkPump::new(16)
                .pump(reader, &sender, &ShutdownSignal::new())
                .await
        });

        tokio::task::yield_now().await;
        drop(body);

        let result = tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .expect("pump should notice the dropped body")
            .unwrap();
        assert!(result.unwrap_err().is_interrupted());
    }

    #[tokio::test]
    async fn test_pump_stops_on_shutdown() {
        let (sender, _body) = archive_channel();
        let (_writer, reader) = tokio::io::duplex(64);
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let err = ChunkPump::new(16)
            .pump(reader, &sender, &shutdown)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ArchiveError::Interrupted {
                reason: InterruptReason::Shutdown
            }
        ));
    }

    #[tokio::test]
    async fn test_body_is_bounded_to_one_chunk_ahead() {
        let data = pattern(1_000);
        let (sender, mut body) = archive_channel();

        let pump = tokio::spawn(async move {
            let result = ChunkPump::new(100)
                .pump(&data[..], &sender, &ShutdownSignal::new())
                .await;
            (result, sender)
        });

        // Nobody reads: the pump parks with one chunk queued.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pump.is_finished());

        let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(first.len(), 100);
        pump.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_delays_between_chunks() {
        let interval = Duration::from_secs(5);
        let reader = tokio_test::io::Builder::new()
            .read(b"one")
            .read(b"two")
            .read(b"three")
            .build();

        let (sender, body) = archive_channel();
        let collector = tokio::spawn(collect_frames(body));

        let start = Instant::now();
        let summary = ChunkPump::new(1_024)
            .with_pacing(Some(interval))
            .pump(reader, &sender, &ShutdownSignal::new())
            .await
            .unwrap();
        sender.finish();
        collector.await.unwrap();

        assert_eq!(summary.chunks, 3);
        assert!(start.elapsed() >= interval * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_pacing_means_no_delay() {
        let reader = tokio_test::io::Builder::new()
            .read(b"one")
            .read(b"two")
            .read(b"three")
            .build();

        let (sender, body) = archive_channel();
        let collector = tokio::spawn(collect_frames(body));

        let start = Instant::now();
        ChunkPump::new(1_024)
            .pump(reader, &sender, &ShutdownSignal::new())
            .await
            .unwrap();
        sender.finish();
        collector.await.unwrap();

        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_unfinished_body_yields_error() {
        let (sender, body) = archive_channel();
        drop(sender);

        let (frames, error) = collect_frames(body).await;
        assert!(frames.is_empty());
        assert!(error.is_some());
    }

    #[test]
    fn test_from_streaming_section() {
        let section = StreamingSection {
            chunk_size: 512,
            throttle: true,
            throttle_interval_ms: 250,
        };

        let pump = ChunkPump::from(&section);
        assert_eq!(pump.chunk_size(), 512);
        assert_eq!(pump.pacing(), Some(Duration::from_millis(250)));
        assert_eq!(ChunkPump::default().chunk_size(), DEFAULT_CHUNK_SIZE);
    }
}
