//! Typed configuration for photopack.
//!
//! This crate provides the configuration model for the archive server with
//! support for:
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict parsing (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use photopack_config::ConfigLoader;
//!
//! # fn main() -> Result<(), photopack_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("photopack.toml")?
//!     .with_dotenv()
//!     .with_env_prefix("PHOTOPACK")
//!     .load()?;
//!
//! println!("Serving archives from {}", config.catalog.root.display());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//!
//! [catalog]
//! root = "test_photos"
//! index_page = "index.html"
//! not_found_page = "404.html"
//!
//! [archiver]
//! program = "zip"
//! args = ["-r", "-"]
//! reap_grace_ms = 500
//!
//! [streaming]
//! chunk_size = 102400
//! throttle = false
//! throttle_interval_ms = 5000
//!
//! [logging]
//! enabled = true
//! level = "info"
//! format = "pretty"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Every key can be overridden with `PREFIX__SECTION__KEY`, e.g.
//! `PHOTOPACK__CATALOG__ROOT=/srv/photos` or `PHOTOPACK__STREAMING__THROTTLE=true`.

#![doc(html_root_url = "https://docs.rs/photopack-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::PhotopackConfig;
pub use error::ConfigError;
pub use loader::{parse_bool, ConfigLoader};
pub use schema::{
    ArchiverSection, CatalogSection, LogFormat, LoggingSection, ServerSection, StreamingSection,
    DEFAULT_CHUNK_SIZE,
};
