//! Archive transfer counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every archive request.
///
/// `alive` goes up when an archiver is spawned and down exactly once when it
/// has been reaped (or handed to the runtime to reap on drop).
#[derive(Debug, Default)]
pub struct ArchiveStats {
    spawned: AtomicU64,
    alive: AtomicU64,
    completed: AtomicU64,
    interrupted: AtomicU64,
    failed: AtomicU64,
    not_found: AtomicU64,
}

impl ArchiveStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_spawned(&self) {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        self.alive.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_released(&self) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_interrupted(&self) {
        self.interrupted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::SeqCst);
    }

    /// Archiver processes started.
    #[must_use]
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Archiver processes not yet reaped.
    #[must_use]
    pub fn alive(&self) -> u64 {
        self.alive.load(Ordering::SeqCst)
    }

    /// Transfers that reached end-of-stream.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Transfers cancelled by a disconnect or shutdown.
    #[must_use]
    pub fn interrupted(&self) -> u64 {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Transfers that failed reading the archiver output.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Requests for identifiers that did not resolve.
    #[must_use]
    pub fn not_found(&self) -> u64 {
        self.not_found.load(Ordering::SeqCst)
    }
}
