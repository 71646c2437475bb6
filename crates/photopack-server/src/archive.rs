//! Archive download requests.
//!
//! [`ArchiveHandler`] ties the pieces together for `GET /archive/{id}/`:
//!
//! ```text
//! locate ──► NotFound ──────────────────────────────► 404 page
//!    │
//!    ▼
//! spawn archiver ──► headers ──► pump chunks ──► Completed ─┐
//!                                     │                     │
//!                                     ├────► Interrupted ───┤
//!                                     └────► Failed ────────┤
//!                                                           ▼
//!                                                 kill + reap (always)
//! ```
//!
//! The transfer runs in its own task that owns the archiver process. The
//! response body is the only link back to the client, so when hyper drops it
//! the pump sees the closed channel, the task kills and reaps the process,
//! and the task resolves to [`ArchiveError::Interrupted`].

use std::sync::Arc;

use http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body_util::BodyExt;
use photopack_config::PhotopackConfig;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::archiver::{ArchiverCommand, ArchiverProcess};
use crate::catalog::Catalog;
use crate::error::{ArchiveError, ArchiveResult};
use crate::pages::{html_response, PageSet};
use crate::server::HttpResponse;
use crate::shutdown::ShutdownSignal;
use crate::stats::ArchiveStats;
use crate::stream::{archive_channel, ArchiveBody, ChunkPump, ChunkSender, TransferSummary};

const ARCHIVE_EXTENSION: &str = "zip";

/// Handle to a running archive transfer.
pub type TransferHandle = JoinHandle<ArchiveResult<TransferSummary>>;

/// An archive whose transfer has started.
#[derive(Debug)]
pub struct ArchiveDownload {
    filename: String,
    pid: Option<u32>,
    body: ArchiveBody,
    transfer: TransferHandle,
}

impl ArchiveDownload {
    /// Download file name, `{identifier}.zip`.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Process id of the archiver.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Splits into the response body and the transfer task.
    ///
    /// Dropping the handle detaches the task; it still cleans up on its own.
    #[must_use]
    pub fn into_parts(self) -> (ArchiveBody, TransferHandle) {
        (self.body, self.transfer)
    }
}

/// Serves archive downloads.
#[derive(Debug, Clone)]
pub struct ArchiveHandler {
    catalog: Catalog,
    archiver: ArchiverCommand,
    pump: ChunkPump,
    pages: PageSet,
    stats: Arc<ArchiveStats>,
}

impl ArchiveHandler {
    /// Creates a handler from its parts.
    #[must_use]
    pub fn new(
        catalog: Catalog,
        archiver: ArchiverCommand,
        pump: ChunkPump,
        pages: PageSet,
    ) -> Self {
        Self {
            catalog,
            archiver,
            pump,
            pages,
            stats: Arc::new(ArchiveStats::new()),
        }
    }

    /// Creates a handler from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &PhotopackConfig) -> Self {
        Self::new(
            Catalog::new(&config.catalog.root),
            ArchiverCommand::from(&config.archiver),
            ChunkPump::from(&config.streaming),
            PageSet::from(&config.catalog),
        )
    }

    /// Shared transfer counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<ArchiveStats> {
        &self.stats
    }

    /// HTML documents served alongside archives.
    #[must_use]
    pub fn pages(&self) -> &PageSet {
        &self.pages
    }

    /// The catalog archives are looked up in.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Locates the archive, starts the archiver and spawns the transfer task.
    ///
    /// No process is started unless the identifier resolves.
    ///
    /// # Errors
    ///
    /// Returns the locator's error, or [`ArchiveError::Spawn`].
    pub async fn start(
        &self,
        identifier: &str,
        shutdown: ShutdownSignal,
    ) -> ArchiveResult<ArchiveDownload> {
        let target = match self.catalog.locate(identifier).await {
            Ok(target) => target,
            Err(e) => {
                if e.is_not_found() {
                    self.stats.record_not_found();
                }
                return Err(e);
            }
        };

        let mut process = self.archiver.spawn(&target, &self.stats)?;
        let stdout = process_with_stdout(&mut process, self.archiver.program()).await?;
        let pid = process.pid();
        let span = tracing::info_span!("archive", archive = %identifier, pid);

        let (sender, body) = archive_channel();
        let transfer = tokio::spawn(
            run_transfer(
                stdout,
                process,
                self.pump,
                self.archiver.reap_grace(),
                sender,
                shutdown,
                Arc::clone(&self.stats),
            )
            .instrument(span),
        );

        Ok(ArchiveDownload {
            filename: format!("{identifier}.{ARCHIVE_EXTENSION}"),
            pid,
            body,
            transfer,
        })
    }

    /// Answers an archive request.
    ///
    /// `200` with a streaming ZIP body, `404` with the not-found page, or
    /// `500` if the archiver could not be started.
    pub async fn handle(&self, identifier: &str, shutdown: ShutdownSignal) -> HttpResponse {
        let disposition = content_disposition(identifier);

        match self.start(identifier, shutdown).await {
            Ok(download) => {
                tracing::info!(
                    archive = identifier,
                    pid = download.pid(),
                    "Archive download started"
                );
                let (body, _transfer) = download.into_parts();

                let mut response = Response::new(body.boxed());
                let headers = response.headers_mut();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/zip"));
                headers.insert(CONTENT_DISPOSITION, disposition);
                response
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(archive = identifier, "Archive not found");
                self.pages.not_found_response().await
            }
            Err(e) => {
                tracing::error!(archive = identifier, error = %e, "Failed to start archive");
                html_response(
                    e.status_code(),
                    "<html><body><h1>Archive could not be created</h1></body></html>",
                )
            }
        }
    }
}

/// Takes stdout, or kills the process if it was not captured.
async fn process_with_stdout(
    process: &mut ArchiverProcess,
    program: &str,
) -> ArchiveResult<tokio::process::ChildStdout> {
    match process.take_stdout() {
        Some(stdout) => Ok(stdout),
        None => {
            if let Err(e) = process.terminate().await {
                tracing::warn!(error = %e, "Failed to kill archiver");
            }
            Err(ArchiveError::spawn(
                program,
                std::io::Error::other("archiver stdout was not captured"),
            ))
        }
    }
}

async fn run_transfer(
    stdout: tokio::process::ChildStdout,
    mut process: ArchiverProcess,
    pump: ChunkPump,
    reap_grace: std::time::Duration,
    sender: ChunkSender,
    shutdown: ShutdownSignal,
    stats: Arc<ArchiveStats>,
) -> ArchiveResult<TransferSummary> {
    let result = pump.pump(stdout, &sender, &shutdown).await;

    match &result {
        Ok(summary) => {
            if let Err(e) = process.finish(reap_grace).await {
                tracing::warn!(error = %e, "Failed to reap archiver");
            }
            tracing::info!(bytes = summary.bytes, chunks = summary.chunks, "Archive sent");
            stats.record_completed();
        }
        Err(e) if e.is_interrupted() => {
            tracing::info!(reason = %e, "Download was interrupted");
            stats.record_interrupted();
        }
        Err(e) => {
            tracing::error!(error = %e, "Archive stream failed");
            stats.record_failed();
        }
    }

    match process.terminate().await {
        Ok(true) => tracing::info!("Process was killed"),
        Ok(false) => {}
        Err(e) => tracing::error!(error = %e, "Failed to kill archiver"),
    }

    if result.is_ok() {
        sender.finish();
    }
    result
}

/// `attachment; filename={identifier}.zip`, falling back to `archive.zip` if
/// the identifier can't be carried in a header.
fn content_disposition(identifier: &str) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "attachment; filename={identifier}.{ARCHIVE_EXTENSION}"
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=archive.zip"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn catalog_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("abc123");
        std::fs::create_dir(&album).unwrap();
        std::fs::write(album.join("a.jpg"), b"aaaa").unwrap();
        std::fs::write(album.join("b.jpg"), b"bbbb").unwrap();
        dir
    }

    fn handler(dir: &TempDir, program: &str, args: &[&str]) -> ArchiveHandler {
        ArchiveHandler::new(
            Catalog::new(dir.path()),
            ArchiverCommand::new(program, args.iter().copied()),
            ChunkPump::new(4),
            PageSet::new(dir.path().join("index.html"), dir.path().join("404.html")),
        )
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("abc123"),
            "attachment; filename=abc123.zip"
        );
        assert_eq!(
            content_disposition("bad\nname"),
            "attachment; filename=archive.zip"
        );
    }

    #[tokio::test]
    async fn test_not_found_spawns_nothing() {
        let dir = catalog_dir();
        let handler = handler(&dir, "cat", &[]);

        let response = handler.handle("does-not-exist", ShutdownSignal::new()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(handler.stats().spawned(), 0);
        assert_eq!(handler.stats().not_found(), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_500() {
        let dir = catalog_dir();
        let handler = handler(&dir, "photopack-no-such-archiver", &[]);

        let response = handler.handle("abc123", ShutdownSignal::new()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(handler.stats().spawned(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_completed_transfer_reaps_process() {
        let dir = catalog_dir();
        let handler = handler(&dir, "cat", &[]);

        let download = handler.start("abc123", ShutdownSignal::new()).await.unwrap();
        assert_eq!(download.filename(), "abc123.zip");

        let (body, transfer) = download.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"aaaabbbb");

        let summary = transfer.await.unwrap().unwrap();
        assert_eq!(summary.bytes, 8);
        assert!(summary.chunks >= 2);
        assert_eq!(handler.stats().completed(), 1);
        assert_eq!(handler.stats().alive(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_body_kills_process() {
        let dir = catalog_dir();
        let handler = handler(&dir, "yes", &[]);

        let download = handler.start("abc123", ShutdownSignal::new()).await.unwrap();
        let (mut body, transfer) = download.into_parts();

        let first = body.frame().await.unwrap().unwrap();
        assert!(first.data_ref().is_some());
        drop(body);

        let result = tokio::time::timeout(Duration::from_secs(5), transfer)
            .await
            .expect("transfer should stop after the body is dropped")
            .unwrap();

        assert!(result.unwrap_err().is_interrupted());
        assert_eq!(handler.stats().interrupted(), 1);
        assert_eq!(handler.stats().alive(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_interrupts_transfer() {
        let dir = catalog_dir();
        let handler = handler(&dir, "yes", &[]);
        let shutdown = ShutdownSignal::new();

        let download = handler.start("abc123", shutdown.clone()).await.unwrap();
        let (mut body, transfer) = download.into_parts();
        body.frame().await.unwrap().unwrap();

        shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), transfer)
            .await
            .unwrap()
            .unwrap();
        assert!(result.unwrap_err().is_interrupted());
        assert_eq!(handler.stats().alive(), 0);

        // The client sees an aborted body, not a clean end.
        let mut saw_error = false;
        while let Some(frame) = body.frame().await {
            if frame.is_err() {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);
    }
}
