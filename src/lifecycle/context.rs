//! Shutdown signal context.
//!
//! A [`ShutdownContext`] is a cancellation scope that becomes done exactly
//! once: when its parent token is cancelled, when SIGINT or SIGTERM is
//! delivered, or when its [`Release`] handle is used. The first cause to
//! arrive is latched as the [`ShutdownReason`]; later causes are ignored.

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::lifecycle::signals::{SignalKind, SignalSubscription};

/// Why a shutdown context became done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A termination signal was delivered.
    Signal(SignalKind),
    /// The server's start operation failed.
    StartFailed,
    /// The server's start operation returned "closed normally" on its own.
    ServerClosed,
    /// The parent was cancelled or the context was released.
    Cancelled,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Signal(kind) => write!(f, "signal {}", kind),
            ShutdownReason::StartFailed => f.write_str("start failed"),
            ShutdownReason::ServerClosed => f.write_str("server closed"),
            ShutdownReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    /// First reason to fire. Written before `token` is cancelled.
    reason: Mutex<Option<ShutdownReason>>,
}

/// Cancellable scope tied to termination-signal delivery.
///
/// Clones share the same latch.
#[derive(Debug, Clone)]
pub struct ShutdownContext {
    inner: Arc<Inner>,
}

impl ShutdownContext {
    fn new(parent: &CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: parent.child_token(),
                reason: Mutex::new(None),
            }),
        }
    }

    /// Mark the context done with `reason`.
    ///
    /// Returns `true` if this call fired the latch, `false` if the context
    /// was already done.
    pub fn cancel_with(&self, reason: ShutdownReason) -> bool {
        let mut slot = self
            .inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() || self.inner.token.is_cancelled() {
            return false;
        }
        *slot = Some(reason);
        self.inner.token.cancel();
        true
    }

    /// Wait until the context is done.
    pub async fn done(&self) {
        self.inner.token.cancelled().await
    }

    /// Whether the context is done. Never reverts to `false`.
    pub fn is_done(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// The reason the context became done, or `None` while it is live.
    pub fn reason(&self) -> Option<ShutdownReason> {
        if !self.is_done() {
            return None;
        }
        let slot = self
            .inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Some(slot.unwrap_or(ShutdownReason::Cancelled))
    }

    /// The underlying token, for handing to collaborators that only need to
    /// observe cancellation.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }
}

/// Release function for a [`ShutdownContext`].
///
/// Restores the default handling of SIGINT and SIGTERM and marks the context
/// done. Dropping the handle releases as well.
#[derive(Debug)]
#[must_use = "dropping the release handle immediately cancels the context"]
pub struct Release {
    context: ShutdownContext,
    subscription: SignalSubscription,
}

impl Release {
    /// Restore default signal handling and cancel the context.
    ///
    /// Safe to call any number of times.
    pub fn release(&self) {
        self.subscription.release();
        self.context.cancel_with(ShutdownReason::Cancelled);
    }
}

impl Drop for Release {
    fn drop(&mut self) {
        self.release();
    }
}

/// Create a shutdown context rooted at a fresh background token.
pub fn new_shutdown_context() -> (ShutdownContext, Release) {
    derive_shutdown_context(&CancellationToken::new())
}

/// Create a shutdown context that is done when `parent` is cancelled or a
/// termination signal is delivered, whichever happens first.
pub fn derive_shutdown_context(parent: &CancellationToken) -> (ShutdownContext, Release) {
    let context = ShutdownContext::new(parent);

    let notified = context.clone();
    let subscription = SignalSubscription::register(move |kind| {
        notified.cancel_with(ShutdownReason::Signal(kind));
    });

    let release = Release {
        context: context.clone(),
        subscription,
    };
    (context, release)
}
