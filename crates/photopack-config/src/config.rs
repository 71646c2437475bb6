//! Root configuration type.
//!
//! This module provides the top-level [`PhotopackConfig`] struct.

use serde::{Deserialize, Serialize};

use crate::{ArchiverSection, CatalogSection, ConfigError, LoggingSection, ServerSection, StreamingSection};

/// Complete photopack server configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables. The value is handed to the server at construction
/// time; nothing reads configuration from global state.
///
/// # Example
///
/// ```
/// use photopack_config::PhotopackConfig;
///
/// let config = PhotopackConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.streaming.chunk_size, 102_400);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PhotopackConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Catalog root and HTML documents.
    #[serde(default)]
    pub catalog: CatalogSection,

    /// External archiving utility.
    #[serde(default)]
    pub archiver: ArchiverSection,

    /// Chunking and pacing of archive transfers.
    #[serde(default)]
    pub streaming: StreamingSection,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl PhotopackConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if:
    /// - `server.http_addr` is not a socket address
    /// - `streaming.chunk_size` is zero
    /// - `archiver.program` is empty
    /// - `logging.level` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .server
            .http_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::invalid(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.streaming.chunk_size == 0 {
            return Err(ConfigError::invalid(
                "streaming.chunk_size",
                "must be greater than zero",
            ));
        }

        if self.archiver.program.trim().is_empty() {
            return Err(ConfigError::invalid(
                "archiver.program",
                "must name an executable",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid("logging.level", "must not be empty"));
        }

        Ok(())
    }
}
