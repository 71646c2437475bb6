//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default chunk size for archive transfers (100 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 102_400;

/// Server configuration section.
///
/// Controls the HTTP listener and the graceful shutdown window.
///
/// # Example
///
/// ```
/// use photopack_config::ServerSection;
///
/// let config = ServerSection {
///     http_addr: "127.0.0.1:8080".to_string(),
///     shutdown_timeout_secs: 10,
/// };
/// assert_eq!(config.shutdown_timeout().as_secs(), 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// HTTP server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// How long in-flight downloads may take to drain on shutdown, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl ServerSection {
    /// Returns the shutdown drain window as a [`Duration`].
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Catalog configuration section.
///
/// Points at the directory tree whose subdirectories are offered as archives,
/// plus the HTML documents served alongside them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CatalogSection {
    /// Catalog root. Every archive identifier names one of its subdirectories.
    #[serde(default = "default_catalog_root")]
    pub root: PathBuf,

    /// HTML document served at `GET /`.
    #[serde(default = "default_index_page")]
    pub index_page: PathBuf,

    /// HTML document served with 404 responses.
    #[serde(default = "default_not_found_page")]
    pub not_found_page: PathBuf,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            root: default_catalog_root(),
            index_page: default_index_page(),
            not_found_page: default_not_found_page(),
        }
    }
}

fn default_catalog_root() -> PathBuf {
    PathBuf::from("test_photos")
}

fn default_index_page() -> PathBuf {
    PathBuf::from("index.html")
}

fn default_not_found_page() -> PathBuf {
    PathBuf::from("404.html")
}

/// Archiver configuration section.
///
/// Describes the external utility that writes a ZIP stream to stdout. The
/// entries of the requested directory are appended after `args`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArchiverSection {
    /// Executable name or path.
    #[serde(default = "default_archiver_program")]
    pub program: String,

    /// Arguments placed before the entry list.
    #[serde(default = "default_archiver_args")]
    pub args: Vec<String>,

    /// How long to wait for the archiver to exit on its own after it closed
    /// stdout, in milliseconds. Past that it is killed.
    #[serde(default = "default_reap_grace")]
    pub reap_grace_ms: u64,
}

impl ArchiverSection {
    /// Returns the post-EOF exit grace period as a [`Duration`].
    #[must_use]
    pub fn reap_grace(&self) -> Duration {
        Duration::from_millis(self.reap_grace_ms)
    }
}

impl Default for ArchiverSection {
    fn default() -> Self {
        Self {
            program: default_archiver_program(),
            args: default_archiver_args(),
            reap_grace_ms: default_reap_grace(),
        }
    }
}

fn default_archiver_program() -> String {
    "zip".to_string()
}

fn default_archiver_args() -> Vec<String> {
    vec!["-r".to_string(), "-".to_string()]
}

fn default_reap_grace() -> u64 {
    500
}

/// Streaming configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StreamingSection {
    /// Maximum bytes read from the archiver and written per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Pause between chunks to simulate a slow link.
    #[serde(default)]
    pub throttle: bool,

    /// Length of the pause, in milliseconds.
    #[serde(default = "default_throttle_interval")]
    pub throttle_interval_ms: u64,
}

impl StreamingSection {
    /// Returns the pacing delay, or `None` when throttling is off.
    #[must_use]
    pub fn pacing(&self) -> Option<Duration> {
        self.throttle
            .then(|| Duration::from_millis(self.throttle_interval_ms))
    }
}

impl Default for StreamingSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            throttle: false,
            throttle_interval_ms: default_throttle_interval(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_throttle_interval() -> u64 {
    5_000
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs.
    Json,
    /// Human-readable pretty format.
    #[default]
    Pretty,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level or `EnvFilter` directive (e.g. "info", "photopack_server=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_section_defaults() {
        let config = ServerSection::default();
        assert_eq!(config.http_addr, "0.0.0.0:8080");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_catalog_section_defaults() {
        let config = CatalogSection::default();
        assert_eq!(config.root, PathBuf::from("test_photos"));
        assert_eq!(config.index_page, PathBuf::from("index.html"));
        assert_eq!(config.not_found_page, PathBuf::from("404.html"));
    }

    #[test]
    fn test_archiver_section_defaults() {
        let config = ArchiverSection::default();
        assert_eq!(config.program, "zip");
        assert_eq!(config.args, vec!["-r", "-"]);
        assert_eq!(config.reap_grace(), Duration::from_millis(500));
    }

    #[test]
    fn test_streaming_pacing_disabled_by_default() {
        let config = StreamingSection::default();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.pacing().is_none());
    }

    #[test]
    fn test_streaming_pacing_enabled() {
        let config = StreamingSection {
            throttle: true,
            throttle_interval_ms: 1_500,
            ..Default::default()
        };
        assert_eq!(config.pacing(), Some(Duration::from_millis(1_500)));
    }

    #[test]
    fn test_log_format_serde() {
        let json: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(json, LogFormat::Json);
        let pretty: LogFormat = serde_json::from_str("\"pretty\"").unwrap();
        assert_eq!(pretty, LogFormat::Pretty);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<StreamingSection, _> = toml::from_str("chunk_bytes = 10");
        assert!(result.is_err());
    }
}
