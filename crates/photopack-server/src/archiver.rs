//! External archiver processes.
//!
//! An [`ArchiverCommand`] describes how to run the archiving utility
//! (`zip -r -` by default). [`ArchiverCommand::spawn`] starts it inside the
//! target directory with the directory's entries as arguments and stdout
//! piped back to us.
//!
//! The returned [`ArchiverProcess`] owns the child for the lifetime of one
//! request:
//!
//! - [`finish`](ArchiverProcess::finish) waits briefly for a natural exit
//!   after end-of-stream, then kills.
//! - [`terminate`](ArchiverProcess::terminate) kills and reaps. It is a no-op
//!   once the child has been reaped.
//! - Dropping an unreaped process sends SIGKILL and leaves reaping to the
//!   Tokio runtime, so no exit path can leak a running archiver.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use photopack_config::ArchiverSection;
use tokio::process::{Child, ChildStdout, Command};

use crate::catalog::ArchiveTarget;
use crate::error::{ArchiveError, ArchiveResult};
use crate::stats::ArchiveStats;

/// How to invoke the archiving utility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiverCommand {
    program: String,
    args: Vec<String>,
    reap_grace: Duration,
}

impl ArchiverCommand {
    /// Creates a command running `program` with `args` before the entry list.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            reap_grace: Duration::from_millis(500),
        }
    }

    /// Sets how long [`ArchiverProcess::finish`] waits before killing.
    #[must_use]
    pub fn with_reap_grace(mut self, grace: Duration) -> Self {
        self.reap_grace = grace;
        self
    }

    /// Program name or path.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Post end-of-stream exit grace period.
    #[must_use]
    pub fn reap_grace(&self) -> Duration {
        self.reap_grace
    }

    /// Starts the archiver for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Spawn`] if the program cannot be launched.
    pub fn spawn(
        &self,
        target: &ArchiveTarget,
        stats: &Arc<ArchiveStats>,
    ) -> ArchiveResult<ArchiverProcess> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(target.entries())
            .current_dir(target.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ArchiveError::spawn(&self.program, e))?;

        stats.record_spawned();
        let stdout = child.stdout.take();
        let pid = child.id();

        tracing::debug!(
            program = %self.program,
            pid,
            entries = target.entries().len(),
            "Archiver started"
        );

        Ok(ArchiverProcess {
            child,
            stdout,
            pid,
            exit_status: None,
            stats: Arc::clone(stats),
        })
    }
}

impl Default for ArchiverCommand {
    fn default() -> Self {
        Self::from(&ArchiverSection::default())
    }
}

impl From<&ArchiverSection> for ArchiverCommand {
    fn from(section: &ArchiverSection) -> Self {
        Self::new(section.program.clone(), section.args.clone())
            .with_reap_grace(section.reap_grace())
    }
}

/// A running archiver owned by one request.
#[derive(Debug)]
pub struct ArchiverProcess {
    child: Child,
    stdout: Option<ChildStdout>,
    pid: Option<u32>,
    exit_status: Option<ExitStatus>,
    stats: Arc<ArchiveStats>,
}

impl ArchiverProcess {
    /// OS process id, if known at spawn time.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Takes the stdout pipe. Returns `None` after the first call.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Exit status, once the process has been reaped.
    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Returns `true` once the process has been reaped.
    #[must_use]
    pub fn is_reaped(&self) -> bool {
        self.exit_status.is_some()
    }

    /// Waits up to `grace` for the process to exit on its own, then kills it.
    ///
    /// The exit code is informational; a non-zero status is logged, not
    /// returned as an error.
    pub async fn finish(&mut self, grace: Duration) -> io::Result<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                if !status.success() {
                    tracing::warn!(pid = self.pid, %status, "Archiver exited with failure");
                }
                self.record_exit(status);
                Ok(status)
            }
            Err(_) => {
                tracing::warn!(
                    pid = self.pid,
                    grace_ms = grace.as_millis(),
                    "Archiver still running after end of stream"
                );
                self.terminate().await?;
                self.exit_status
                    .ok_or_else(|| io::Error::other("archiver was not reaped"))
            }
        }
    }

    /// Kills the process if it is still running and reaps it.
    ///
    /// Returns `true` if a kill was sent. Calling this on a process that has
    /// already exited or been reaped returns `Ok(false)`.
    pub async fn terminate(&mut self) -> io::Result<bool> {
        if self.exit_status.is_some() {
            return Ok(false);
        }

        if let Some(status) = self.child.try_wait()? {
            self.record_exit(status);
            return Ok(false);
        }

        match self.child.kill().await {
            Ok(()) => {}
            // Exited between try_wait and kill.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }

        let status = self.child.wait().await?;
        self.record_exit(status);
        Ok(true)
    }

    fn record_exit(&mut self, status: ExitStatus) {
        if self.exit_status.is_none() {
            self.exit_status = Some(status);
            self.stats.record_released();
        }
    }
}

impl Drop for ArchiverProcess {
    fn drop(&mut self) {
        if self.exit_status.is_none() {
            if let Err(e) = self.child.start_kill() {
                tracing::debug!(pid = self.pid, error = %e, "Archiver already gone on drop");
            }
            self.stats.record_released();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn target_in(dir: &TempDir) -> ArchiveTarget {
        std::fs::create_dir_all(dir.path().join("album")).unwrap();
        std::fs::write(dir.path().join("album/a.jpg"), b"photo-a").unwrap();
        Catalog::new(dir.path()).locate("album").await.unwrap()
    }

    // No entries, so `sleep 30` gets no trailing arguments.
    async fn empty_target_in(dir: &TempDir) -> ArchiveTarget {
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        Catalog::new(dir.path()).locate("empty").await.unwrap()
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir).await;
        let stats = Arc::new(ArchiveStats::new());

        let command = ArchiverCommand::new("photopack-no-such-archiver", ["-r", "-"]);
        let err = command.spawn(&target, &stats).unwrap_err();

        assert!(matches!(err, ArchiveError::Spawn { .. }));
        assert_eq!(stats.spawned(), 0);
        assert_eq!(stats.alive(), 0);
    }

    #[tokio::test]
    async fn test_runs_in_target_dir_with_entries() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir).await;
        let stats = Arc::new(ArchiveStats::new());

        // `cat a.jpg` only works if cwd is the album.
        let command = ArchiverCommand::new("cat", Vec::<String>::new());
        let mut process = command.spawn(&target, &stats).unwrap();
        let mut stdout = process.take_stdout().unwrap();
        assert!(process.take_stdout().is_none());
        assert!(process.exit_status().is_none());

        let mut output = Vec::new();
        stdout.read_to_end(&mut output).await.unwrap();
        assert_eq!(output, b"photo-a");

        let status = process.finish(Duration::from_secs(5)).await.unwrap();
        assert!(status.success());
        assert_eq!(process.exit_status(), Some(status));
        assert!(process.is_reaped());
        assert_eq!(stats.alive(), 0);
    }

    #[tokio::test]
    async fn test_terminate_kills_running_process() {
        let dir = TempDir::new().unwrap();
        let target = empty_target_in(&dir).await;
        let stats = Arc::new(ArchiveStats::new());

        let command = ArchiverCommand::new("sleep", ["30"]);
        let mut process = command.spawn(&target, &stats).unwrap();
        assert_eq!(stats.alive(), 1);

        assert!(process.terminate().await.unwrap());
        assert!(process.is_reaped());
        assert_eq!(stats.alive(), 0);
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir).await;
        let stats = Arc::new(ArchiveStats::new());

        let command = ArchiverCommand::new("true", Vec::<String>::new());
        let mut process = command.spawn(&target, &stats).unwrap();
        process.finish(Duration::from_secs(5)).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), process.terminate()).await;
        let second = tokio::time::timeout(Duration::from_secs(1), process.terminate()).await;
        assert!(!first.unwrap().unwrap());
        assert!(!second.unwrap().unwrap());
        assert_eq!(stats.alive(), 0);
    }

    #[tokio::test]
    async fn test_finish_kills_after_grace() {
        let dir = TempDir::new().unwrap();
        let target = empty_target_in(&dir).await;
        let stats = Arc::new(ArchiveStats::new());

        let command = ArchiverCommand::new("sleep", ["30"]);
        let mut process = command.spawn(&target, &stats).unwrap();

        let status = process.finish(Duration::from_millis(20)).await.unwrap();
        assert!(!status.success());
        assert_eq!(stats.alive(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_process() {
        let dir = TempDir::new().unwrap();
        let target = empty_target_in(&dir).await;
        let stats = Arc::new(ArchiveStats::new());

        let command = ArchiverCommand::new("sleep", ["30"]);
        let process = command.spawn(&target, &stats).unwrap();
        drop(process);

        assert_eq!(stats.spawned(), 1);
        assert_eq!(stats.alive(), 0);
    }

    #[test]
    fn test_from_section() {
        let command = ArchiverCommand::default();
        assert_eq!(command.program(), "zip");
        assert_eq!(command.args, vec!["-r", "-"]);
        assert_eq!(command.reap_grace(), Duration::from_millis(500));
    }
}
