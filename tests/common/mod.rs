//! Shared utilities for integration testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use sigctx::{ServeError, Server};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How the mock's `start` behaves.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum StartMode {
    /// Run until shutdown, then return the closed sentinel.
    Block,
    /// Fail immediately with a non-sentinel error.
    FailImmediately,
    /// Return the closed sentinel immediately.
    CloseImmediately,
    /// Cancel the parent token handed to `with_parent`, then return `Ok(())`.
    CancelParent,
}

/// How the mock's `shutdown` behaves.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum ShutdownMode {
    /// Stop the start loop and return.
    Succeed,
    /// Never return.
    Hang,
}

/// A single observed shutdown call.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub struct ShutdownCall {
    pub called_at: Instant,
    pub deadline: Instant,
    /// SIGINT had its default disposition when shutdown was invoked.
    pub sigint_default: bool,
}

/// Scriptable server recording how the sequencer drives it.
pub struct MockServer {
    start_mode: StartMode,
    shutdown_mode: ShutdownMode,
    stop: CancellationToken,
    parent: Option<CancellationToken>,
    started: Notify,
    start_calls: AtomicUsize,
    shutdown_calls: Mutex<Vec<ShutdownCall>>,
}

#[allow(dead_code)]
impl MockServer {
    pub fn new(start_mode: StartMode, shutdown_mode: ShutdownMode) -> Self {
        Self {
            start_mode,
            shutdown_mode,
            stop: CancellationToken::new(),
            parent: None,
            started: Notify::new(),
            start_calls: AtomicUsize::new(0),
            shutdown_calls: Mutex::new(Vec::new()),
        }
    }

    /// Token cancelled by `StartMode::CancelParent`.
    pub fn with_parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Wait until `start` has been entered.
    pub async fn wait_started(&self) {
        let notified = self.started.notified();
        if self.start_calls.load(Ordering::SeqCst) > 0 {
            return;
        }
        tokio::time::timeout(Duration::from_secs(2), notified)
            .await
            .expect("server was never started");
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> Vec<ShutdownCall> {
        self.shutdown_calls.lock().unwrap().clone()
    }
}

impl Server for MockServer {
    async fn start(&self) -> Result<(), ServeError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_waiters();

        match self.start_mode {
            StartMode::Block => {
                self.stop.cancelled().await;
                Err(ServeError::ServerClosed)
            }
            StartMode::FailImmediately => Err(ServeError::Other("address already in use".into())),
            StartMode::CloseImmediately => Err(ServeError::ServerClosed),
            StartMode::CancelParent => {
                if let Some(parent) = &self.parent {
                    parent.cancel();
                }
                Ok(())
            }
        }
    }

    async fn shutdown(&self, deadline: Instant) -> Result<(), ServeError> {
        self.shutdown_calls.lock().unwrap().push(ShutdownCall {
            called_at: Instant::now(),
            deadline,
            sigint_default: sigint_is_default(),
        });

        match self.shutdown_mode {
            ShutdownMode::Succeed => {
                self.stop.cancel();
                Ok(())
            }
            ShutdownMode::Hang => std::future::pending().await,
        }
    }
}

/// Whether SIGINT/SIGTERM currently perform their default action.
pub fn sigint_is_default() -> bool {
    sigctx::lifecycle::default_handling_active()
}
