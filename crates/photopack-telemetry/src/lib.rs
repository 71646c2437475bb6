//! Logging setup for photopack.
//!
//! Photopack reports through `tracing`. This crate turns the `[logging]`
//! configuration section into an installed subscriber.
//!
//! ```rust,ignore
//! use photopack_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::from(&config.logging))?;
//! ```

#![doc(html_root_url = "https://docs.rs/photopack-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
