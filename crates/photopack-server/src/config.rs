//! Listener settings.
//!
//! ```rust
//! use photopack_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::new("127.0.0.1:8080").with_drain_timeout(Duration::from_secs(5));
//! assert_eq!(config.socket_addr().unwrap().port(), 8080);
//! ```

use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

use photopack_config::ServerSection;

/// Where to listen and how long to wait for downloads on shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    addr: String,
    drain_timeout: Duration,
}

impl ServerConfig {
    /// Listens on `addr` with the configured default drain window.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            drain_timeout: ServerSection::default().shutdown_timeout(),
        }
    }

    /// Replaces the drain window.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// The bind address as configured.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The bind address, parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.addr.parse()
    }

    /// How long shutdown waits for open connections before giving up.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSection::default())
    }
}

impl From<&ServerSection> for ServerConfig {
    fn from(section: &ServerSection) -> Self {
        Self::new(section.http_addr.as_str()).with_drain_timeout(section.shutdown_timeout())
    }
}
