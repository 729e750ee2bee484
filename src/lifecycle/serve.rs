//! Serve sequencing.
//!
//! # Data Flow
//! ```text
//! STARTING:       derive shutdown context → spawn server.start()
//! RUNNING:        wait for the context (signal, parent, start failure, self-close)
//! FAILED:         start failed or server closed on its own → release, return
//! SHUTTING_DOWN:  release (restore default signals) → server.shutdown(deadline)
//! DONE:           log shutdown error, if any; no retry
//! ```
//!
//! # Design Decisions
//! - The context latch is the only channel between the start task and the
//!   sequencer; its reason decides the branch
//! - Default signal handling is restored before shutdown is invoked, so a
//!   second Ctrl+C during the grace period terminates the process
//! - The shutdown call is bounded by the deadline even if the server ignores it

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::context::{derive_shutdown_context, ShutdownReason};
use crate::lifecycle::grace::shutdown_grace_period;

/// Errors reported by a [`Server`].
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// The server was closed intentionally. Not a failure.
    #[error("server closed")]
    ServerClosed,
    /// The listener could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Shutdown did not complete before its deadline.
    #[error("shutdown deadline exceeded")]
    DeadlineExceeded,
    #[error("{0}")]
    Other(String),
}

impl ServeError {
    /// Whether this is the "closed normally" sentinel.
    pub fn is_server_closed(&self) -> bool {
        matches!(self, ServeError::ServerClosed)
    }
}

/// A server whose lifecycle the sequencer drives.
///
/// `start` runs until the server stops. Returning `Ok(())` or
/// [`ServeError::ServerClosed`] means it stopped intentionally.
/// `shutdown` stops accepting new work and waits for in-flight work until
/// `deadline`.
pub trait Server: Send + Sync + 'static {
    fn start(&self) -> impl Future<Output = Result<(), ServeError>> + Send;

    fn shutdown(&self, deadline: Instant) -> impl Future<Output = Result<(), ServeError>> + Send;
}

/// What a serve sequence did.
#[derive(Debug)]
pub struct ServeOutcome {
    /// Why the sequencer stopped waiting.
    pub reason: ShutdownReason,
    /// Error returned by `start`, excluding the closed-normally sentinel.
    pub start_error: Option<ServeError>,
    /// Result of the shutdown call; `None` when shutdown was skipped.
    pub shutdown: Option<Result<(), ServeError>>,
}

/// Run `server` until SIGINT or SIGTERM, then shut it down gracefully within
/// the process-wide grace period.
///
/// Errors are reported through `tracing` only.
pub async fn serve<S: Server>(server: Arc<S>) {
    let outcome = serve_with(server, &CancellationToken::new(), shutdown_grace_period()).await;
    tracing::debug!(reason = %outcome.reason, "Serve sequence finished");
}

/// Run `server` until `parent` is cancelled or a termination signal arrives,
/// then shut it down within `grace_period`.
pub async fn serve_with<S: Server>(
    server: Arc<S>,
    parent: &CancellationToken,
    grace_period: Duration,
) -> ServeOutcome {
    let (ctx, release) = derive_shutdown_context(parent);

    let starter = ctx.clone();
    let running = Arc::clone(&server);
    let mut start_task = tokio::spawn(async move {
        let result = running.start().await;
        match &result {
            Err(e) if !e.is_server_closed() => {
                tracing::error!(error = %e, "Error while listening and serving");
                starter.cancel_with(ShutdownReason::StartFailed);
            }
            _ => {
                if starter.cancel_with(ShutdownReason::ServerClosed) {
                    tracing::info!("Server closed before shutdown was requested");
                }
            }
        }
        result
    });

    let early = tokio::select! {
        _ = ctx.done() => None,
        joined = &mut start_task => Some(joined),
    };
    if let Some(Err(join_error)) = &early {
        tracing::error!(error = %join_error, "Server start task aborted");
        ctx.cancel_with(ShutdownReason::StartFailed);
    }
    let reason = ctx.reason().unwrap_or(ShutdownReason::Cancelled);

    match reason {
        ShutdownReason::StartFailed | ShutdownReason::ServerClosed => {
            // Nothing is running; skip shutdown.
            release.release();
            let joined = match early {
                Some(joined) => joined,
                None => start_task.await,
            };
            return ServeOutcome {
                reason,
                start_error: start_error(joined),
                shutdown: None,
            };
        }
        ShutdownReason::Signal(kind) => {
            tracing::debug!(signal = %kind, "Shutdown requested by signal");
        }
        ShutdownReason::Cancelled => {
            tracing::debug!("Shutdown requested by parent context");
        }
    }

    release.release();
    tracing::info!("Shutting down gracefully, press Ctrl+C to force");

    let deadline = Instant::now() + grace_period;
    let result = match tokio::time::timeout_at(deadline, server.shutdown(deadline)).await {
        Ok(result) => result,
        Err(_) => Err(ServeError::DeadlineExceeded),
    };
    if let Err(e) = &result {
        tracing::error!(
            error = %e,
            grace_period_ms = grace_period.as_millis() as u64,
            "Error while shutting down server"
        );
    }

    // A handle already polled to completion by the select must not be awaited again.
    let start_error = match early {
        Some(joined) => start_error(joined),
        None if start_task.is_finished() => start_error(start_task.await),
        None => None,
    };

    ServeOutcome {
        reason,
        start_error,
        shutdown: Some(result),
    }
}

fn start_error(joined: Result<Result<(), ServeError>, JoinError>) -> Option<ServeError> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(e)) if e.is_server_closed() => None,
        Ok(Err(e)) => Some(e),
        Err(join_error) => Some(ServeError::Other(format!(
            "server start task aborted: {}",
            join_error
        ))),
    }
}
