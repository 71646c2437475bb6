//! Shutdown coordination.
//!
//! One [`ShutdownSignal`] is cloned into the accept loop, every connection
//! and every archive transfer. Once it fires the listener stops accepting,
//! idle connections are closed and running transfers are cancelled. A
//! cancelled transfer kills and reaps its archiver exactly like one whose
//! client went away.
//!
//! [`ConnectionGauge`] counts open connections so the server can give them
//! a bounded window to drain.
//!
//! ```rust,ignore
//! let shutdown = ShutdownSignal::from_os_signals();
//! tokio::select! {
//!     () = shutdown.triggered() => {}
//!     _ = listener.accept() => {}
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};

/// Process-wide stop flag that can be awaited.
///
/// ```rust
/// use photopack_server::ShutdownSignal;
///
/// let server_side = ShutdownSignal::new();
/// let transfer_side = server_side.clone();
///
/// server_side.trigger();
/// assert!(transfer_side.is_triggered());
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    flag: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// A signal that has not fired.
    #[must_use]
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    /// A signal fired by SIGTERM or SIGINT.
    ///
    /// Spawns the listener task, so it needs a running Tokio runtime.
    #[must_use]
    pub fn from_os_signals() -> Self {
        let shutdown = Self::new();
        let fire = shutdown.clone();

        tokio::spawn(async move {
            os_signal().await;
            fire.trigger();
        });

        shutdown
    }

    /// Fires the signal. Later calls do nothing.
    pub fn trigger(&self) {
        self.flag.send_if_modified(|fired| !std::mem::replace(fired, true));
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once the signal has fired, immediately if it already has.
    pub async fn triggered(&self) {
        let mut rx = self.flag.subscribe();
        // `self` keeps the sender alive, so the channel never closes here.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "Stopping"),
        () = ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn os_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Ctrl+C handler unavailable");
        // Without a handler the only way out is an explicit trigger.
        std::future::pending::<()>().await;
    }
    tracing::info!(signal = "SIGINT", "Stopping");
}

/// Number of open client connections.
///
/// ```rust
/// use photopack_server::ConnectionGauge;
///
/// let gauge = ConnectionGauge::new();
/// let guard = gauge.enter();
/// assert_eq!(gauge.open(), 1);
/// drop(guard);
/// assert_eq!(gauge.open(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionGauge {
    inner: Arc<GaugeInner>,
}

#[derive(Debug, Default)]
struct GaugeInner {
    open: AtomicUsize,
    closed: Notify,
}

impl ConnectionGauge {
    /// A gauge with no open connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one connection until the guard is dropped.
    #[must_use]
    pub fn enter(&self) -> ConnectionGuard {
        self.inner.open.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Connections currently open.
    #[must_use]
    pub fn open(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Resolves when no connection is open.
    pub async fn drained(&self) {
        loop {
            // Register before checking so a drop in between isn't missed.
            let closed = self.inner.closed.notified();
            if self.open() == 0 {
                return;
            }
            closed.await;
        }
    }
}

/// Keeps one connection counted in its [`ConnectionGauge`].
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<GaugeInner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.inner.open.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.closed.notify_waiters();
        }
    }
}
