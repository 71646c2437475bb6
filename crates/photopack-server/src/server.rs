//! The HTTP front end.
//!
//! One hyper HTTP/1.1 connection per accepted socket, each on its own task.
//! Requests for `/` get the index page; requests for
//! `/archive/{archive_hash}/` go to the [`ArchiveHandler`] and receive a
//! body that streams while the archiver runs.
//!
//! ```rust,ignore
//! let config = ConfigLoader::new().with_env_prefix("PHOTOPACK").load()?;
//! Server::from_config(&config).run().await?;
//! ```

use std::convert::Infallible;
use std::io;
use std::pin::pin;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::combinators::BoxBody;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use photopack_config::PhotopackConfig;
use tokio::net::{TcpListener, TcpStream};

use crate::archive::ArchiveHandler;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::pages::html_response;
use crate::router::{Endpoint, Router, ARCHIVE_PARAM};
use crate::shutdown::{ConnectionGauge, ShutdownSignal};

/// Body of every response: whole pages or a streaming archive.
pub type ResponseBody = BoxBody<Bytes, io::Error>;

/// Response produced by every handler.
pub type HttpResponse = http::Response<ResponseBody>;

/// The photopack HTTP server.
pub struct Server {
    config: ServerConfig,
    router: Router,
    archives: ArchiveHandler,
}

impl Server {
    /// Serves `archives` with the given listener settings.
    #[must_use]
    pub fn new(config: ServerConfig, archives: ArchiveHandler) -> Self {
        Self {
            config,
            router: Router::with_default_routes(),
            archives,
        }
    }

    /// Builds every component from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &PhotopackConfig) -> Self {
        Self::new(
            ServerConfig::from(&config.server),
            ArchiveHandler::from_config(config),
        )
    }

    /// Listener settings.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The archive handler and its counters.
    #[must_use]
    pub fn archives(&self) -> &ArchiveHandler {
        &self.archives
    }

    /// Binds and serves until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::from_os_signals())
            .await
    }

    /// Binds and serves until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// [`ServerError::BindError`] if the address is malformed or taken.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.socket_addr().map_err(|e| {
            ServerError::BindError(format!("Invalid address '{}': {e}", self.config.addr()))
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {addr}: {e}")))?;

        self.serve(listener, shutdown).await
    }

    /// Serves an already bound listener until `shutdown` fires, then waits
    /// up to the drain timeout for open connections.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::IoError(e.to_string()))?;
        tracing::info!(
            addr = %local_addr,
            catalog = %self.archives.catalog().root().display(),
            "Serving archives"
        );

        let server = Arc::new(self);
        let connections = ConnectionGauge::new();

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!(error = %e, "Accept failed");
                        continue;
                    }
                },
                () = shutdown.triggered() => break,
            };

            let guard = connections.enter();
            let server = Arc::clone(&server);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = server.serve_connection(stream, shutdown).await {
                    tracing::debug!(%remote_addr, error = %e, "Connection ended with error");
                }
                drop(guard);
            });
        }

        let drain_timeout = server.config.drain_timeout();
        tracing::info!(
            open = connections.open(),
            timeout = ?drain_timeout,
            "No longer accepting connections"
        );

        if tokio::time::timeout(drain_timeout, connections.drained())
            .await
            .is_err()
        {
            tracing::warn!(open = connections.open(), "Connections still open at drain timeout");
        }

        tracing::info!("Stopped");
        Ok(())
    }

    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let server = Arc::clone(&self);
        let per_request = shutdown.clone();
        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            let shutdown = per_request.clone();
            async move { Ok::<_, Infallible>(server.respond(&req, shutdown).await) }
        });

        let mut conn =
            pin!(http1::Builder::new().serve_connection(TokioIo::new(stream), service));

        tokio::select! {
            result = conn.as_mut() => return result,
            () = shutdown.triggered() => conn.as_mut().graceful_shutdown(),
        }

        conn.await
    }

    async fn respond(&self, req: &Request<Incoming>, shutdown: ShutdownSignal) -> HttpResponse {
        tracing::debug!(method = %req.method(), path = req.uri().path(), "Request");
        self.route(req.method(), req.uri().path(), shutdown).await
    }

    async fn route(&self, method: &Method, path: &str, shutdown: ShutdownSignal) -> HttpResponse {
        let Some(route) = self.router.match_route(method, path) else {
            if self.router.matches_path(path) {
                return html_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            }
            return self.archives.pages().not_found_response().await;
        };

        match route.endpoint() {
            Endpoint::Index => self.archives.pages().index_response().await,
            Endpoint::Archive => {
                let identifier = route.param(ARCHIVE_PARAM).unwrap_or_default();
                self.archives.handle(identifier, shutdown).await
            }
        }
    }
}
