//! Error types for archive requests and the server loop.

use std::fmt;
use std::io;
use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

/// Why a transfer stopped before the archiver reached end-of-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    /// The client stopped reading the response body.
    ClientDisconnected,
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientDisconnected => f.write_str("client disconnected"),
            Self::Shutdown => f.write_str("server shutting down"),
        }
    }
}

/// Errors raised while locating, spawning or streaming an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The identifier does not name a directory in the catalog.
    #[error("archive not found: {identifier}")]
    NotFound {
        /// Identifier taken from the request path.
        identifier: String,
    },

    /// The identifier is malformed or escapes the catalog root.
    #[error("invalid archive identifier: {identifier:?}")]
    InvalidIdentifier {
        /// Identifier taken from the request path.
        identifier: String,
    },

    /// The catalog could not be read.
    #[error("failed to read catalog at {path}")]
    Catalog {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The archiving utility could not be launched.
    #[error("failed to spawn archiver `{program}`")]
    Spawn {
        /// Program that was launched.
        program: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The transfer was cancelled before end-of-stream.
    #[error("archive transfer interrupted: {reason}")]
    Interrupted {
        /// What cancelled the transfer.
        reason: InterruptReason,
    },

    /// Reading the archiver output failed mid-stream.
    #[error("archive stream failed")]
    Stream(#[source] io::Error),
}

impl ArchiveError {
    /// Create a not found error.
    pub fn not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            identifier: identifier.into(),
        }
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(identifier: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
        }
    }

    /// Create a catalog read error.
    pub fn catalog(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Catalog {
            path: path.into(),
            source,
        }
    }

    /// Create a spawn error.
    pub fn spawn(program: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Create an interruption error.
    pub fn interrupted(reason: InterruptReason) -> Self {
        Self::Interrupted { reason }
    }

    /// Returns `true` if the request should be answered with the not-found page.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::InvalidIdentifier { .. })
    }

    /// Returns `true` if the transfer was cancelled rather than failed.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// HTTP status for this error, when headers have not been sent yet.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::InvalidIdentifier { .. } => StatusCode::NOT_FOUND,
            Self::Interrupted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Catalog { .. } | Self::Spawn { .. } | Self::Stream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors from the HTTP server loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    /// Failed to bind to the configured address.
    #[error("Bind error: {0}")]
    BindError(String),

    /// I/O error during server operation.
    #[error("I/O error: {0}")]
    IoError(String),
}
