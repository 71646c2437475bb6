//! Streaming ZIP archive server.
//!
//! `GET /archive/{archive_hash}/` zips one directory of the photo catalog on
//! the fly and streams it to the client while the archiver is still writing.
//!
//! # Components
//!
//! - [`Catalog`]: resolves an identifier to a directory under the catalog root
//! - [`ArchiverCommand`] / [`ArchiverProcess`]: runs the external archiver and
//!   owns its lifetime (wait, kill, reap)
//! - [`ChunkPump`] / [`ArchiveBody`]: bounded, paced, back-pressured delivery
//!   of archiver output
//! - [`ArchiveHandler`]: per-request orchestration and cleanup
//! - [`Server`]: hyper accept loop with graceful shutdown
//!
//! # Example
//!
//! ```rust,ignore
//! use photopack_config::ConfigLoader;
//! use photopack_server::Server;
//!
//! let config = ConfigLoader::new().with_env_prefix("PHOTOPACK").load()?;
//! Server::from_config(&config).run().await?;
//! ```

#![doc(html_root_url = "https://docs.rs/photopack-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod archive;
pub mod archiver;
pub mod catalog;
pub mod config;
pub mod error;
pub mod pages;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod stats;
pub mod stream;

pub use archive::{ArchiveDownload, ArchiveHandler, TransferHandle};
pub use archiver::{ArchiverCommand, ArchiverProcess};
pub use catalog::{ArchiveTarget, Catalog};
pub use config::ServerConfig;
pub use error::{ArchiveError, ArchiveResult, InterruptReason, ServerError};
pub use pages::PageSet;
pub use router::{Endpoint, RouteMatch, Router};
pub use server::{HttpResponse, ResponseBody, Server};
pub use shutdown::{ConnectionGauge, ConnectionGuard, ShutdownSignal};
pub use stats::ArchiveStats;
pub use stream::{archive_channel, ArchiveBody, ChunkPump, ChunkSender, TransferSummary};
