//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("configuration file {} does not exist", path.display())]
    NotFound {
        /// The requested file.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read configuration file {}", path.display())]
    Unreadable {
        /// The file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not TOML or JSON.
    #[error("unsupported configuration format '{0}' (expected toml or json)")]
    UnsupportedFormat(String),

    /// Malformed TOML, or TOML with unknown keys.
    #[error("bad TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON, or JSON with unknown keys.
    #[error("bad JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A `PHOTOPACK__SECTION__KEY` variable that names no key or doesn't parse.
    #[error("environment variable {var}: {reason}")]
    BadEnvVar {
        /// Variable name.
        var: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A value that parsed but can't be used.
    #[error("{key}: {reason}")]
    Invalid {
        /// Dotted key, e.g. `streaming.chunk_size`.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn bad_env_var(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadEnvVar {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// A value that parsed but can't be used.
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
