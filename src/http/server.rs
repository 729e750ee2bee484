//! HTTP server adapter.
//!
//! # Responsibilities
//! - Create the Axum router (greeting and health handlers, or the embedding
//!   application's own routes)
//! - Wire up middleware (tracing, request timeout)
//! - Bind the listener and serve until shutdown is requested
//! - Drain in-flight requests within the shutdown deadline
//!
//! # Design Decisions
//! - `start` binds lazily, so a bind failure surfaces as a start failure
//! - After shutdown is requested `start` returns `ServeError::ServerClosed`
//! - Shutdown before start closes the server; a later start is refused

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::lifecycle::{ServeError, Server};

/// Where the serve loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Listening(SocketAddr),
    Stopped,
}

/// HTTP server driven by the serve sequencer.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    started: AtomicBool,
    stop: CancellationToken,
    phase: watch::Sender<Phase>,
}

impl HttpServer {
    /// Create a new HTTP server with the default routes.
    pub fn new(config: ServerConfig) -> Self {
        let routes = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler));
        Self::with_router(config, routes)
    }

    /// Create a new HTTP server serving `routes` behind the standard middleware.
    pub fn with_router(config: ServerConfig, routes: Router) -> Self {
        let router = Self::build_router(&config, routes);
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            router,
            config,
            started: AtomicBool::new(false),
            stop: CancellationToken::new(),
            phase,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, routes: Router) -> Router {
        routes
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Wait until the listener is bound and return its address.
    ///
    /// Call after `start`: on a server that is never started nor shut down
    /// this waits indefinitely. Returns `None` if the server stopped without
    /// binding or shutdown was requested before it bound.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let mut phase = self.phase.subscribe();
        let current = tokio::select! {
            biased;
            changed = phase.wait_for(|p| *p != Phase::Idle) => changed.ok().map(|p| *p),
            _ = self.stop.cancelled() => None,
        };
        match current {
            Some(Phase::Listening(addr)) => Some(addr),
            _ => None,
        }
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    async fn run(&self) -> Result<(), ServeError> {
        let address = &self.config.listener.bind_address;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ServeError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        self.phase.send_replace(Phase::Listening(local_addr));

        tracing::info!(address = %local_addr, "HTTP server starting");

        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(self.stop.clone().cancelled_owned())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

impl Server for HttpServer {
    async fn start(&self) -> Result<(), ServeError> {
        if self.stop.is_cancelled() {
            return Err(ServeError::ServerClosed);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServeError::Other("server already started".into()));
        }

        let result = self.run().await;
        self.phase.send_replace(Phase::Stopped);
        result?;

        if self.stop.is_cancelled() {
            Err(ServeError::ServerClosed)
        } else {
            Ok(())
        }
    }

    async fn shutdown(&self, deadline: Instant) -> Result<(), ServeError> {
        self.stop.cancel();
        if !self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut phase = self.phase.subscribe();
        let drained = async move {
            phase
                .wait_for(|p| *p == Phase::Stopped)
                .await
                .map(|_| ())
        };
        match tokio::time::timeout_at(deadline, drained).await {
            Ok(_) => {
                tracing::info!("HTTP server drained");
                Ok(())
            }
            Err(_) => Err(ServeError::DeadlineExceeded),
        }
    }
}

async fn root_handler() -> &'static str {
    "sigctx server\n"
}

async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
