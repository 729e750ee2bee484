//! OS signal interception.
//!
//! # Responsibilities
//! - Register SIGINT/SIGTERM interception while a subscription is live
//! - Translate delivered signals into subscriber callbacks
//! - Return both signals to their default action on release
//!
//! # Design Decisions
//! - Uses signal-hook: `iterator::Signals` per subscription for delivery
//! - The default action is reinstated through a conditional-default flag, so a
//!   subscription created after an earlier release still intercepts signals
//! - Release arms the default action regardless of other live subscriptions

use std::sync::atomic::{AtomicBool, Ordering};

/// The termination requests a shutdown context watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// SIGINT (Ctrl+C).
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl SignalKind {
    /// Both watched signals.
    pub const ALL: [SignalKind; 2] = [SignalKind::Interrupt, SignalKind::Terminate];

    /// Conventional signal name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Interrupt => "SIGINT",
            SignalKind::Terminate => "SIGTERM",
        }
    }

    /// Raw signal number.
    #[cfg(unix)]
    pub fn as_raw(self) -> i32 {
        match self {
            SignalKind::Interrupt => signal_hook::consts::SIGINT,
            SignalKind::Terminate => signal_hook::consts::SIGTERM,
        }
    }

    #[cfg(unix)]
    fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            signal_hook::consts::SIGINT => Some(SignalKind::Interrupt),
            signal_hook::consts::SIGTERM => Some(SignalKind::Terminate),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether SIGINT/SIGTERM currently perform their default action.
///
/// `true` before any subscription exists and after any release.
pub fn default_handling_active() -> bool {
    platform::default_handling_active()
}

/// Owned registration of the SIGINT/SIGTERM intercept.
///
/// While registered, a delivered signal invokes the subscriber's callback
/// instead of terminating the process. [`SignalSubscription::release`] (or
/// dropping the subscription) returns both signals to their default action.
pub struct SignalSubscription {
    inner: platform::Registration,
    released: AtomicBool,
}

impl SignalSubscription {
    /// Register `notify` for SIGINT and SIGTERM.
    pub fn register<F>(notify: F) -> Self
    where
        F: Fn(SignalKind) + Send + Sync + 'static,
    {
        Self {
            inner: platform::Registration::new(notify),
            released: AtomicBool::new(false),
        }
    }

    /// Restore default signal handling and stop notifying this subscriber.
    ///
    /// Calling this more than once has no further effect.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.close();
    }

    /// Whether [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SignalSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalSubscription")
            .field("id", &self.inner.id())
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for SignalSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(unix)]
mod platform {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex, OnceLock, PoisonError};
    use std::thread::JoinHandle;

    use signal_hook::flag;
    use signal_hook::iterator::{Handle, Signals};

    use super::SignalKind;

    static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

    /// When set, SIGINT/SIGTERM perform their default action.
    static DEFAULT_ACTION: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    fn default_action() -> &'static Arc<AtomicBool> {
        DEFAULT_ACTION.get_or_init(|| {
            let armed = Arc::new(AtomicBool::new(true));
            for kind in SignalKind::ALL {
                if let Err(e) = flag::register_conditional_default(kind.as_raw(), Arc::clone(&armed)) {
                    tracing::warn!(signal = %kind, error = %e, "Failed to register default signal action");
                }
            }
            armed
        })
    }

    pub(super) fn default_handling_active() -> bool {
        DEFAULT_ACTION
            .get()
            .map_or(true, |armed| armed.load(Ordering::SeqCst))
    }

    pub(super) struct Registration {
        id: u64,
        handle: Option<Handle>,
        dispatcher: Mutex<Option<JoinHandle<()>>>,
    }

    impl Registration {
        pub(super) fn new<F>(notify: F) -> Self
        where
            F: Fn(SignalKind) + Send + Sync + 'static,
        {
            let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
            let armed = default_action();

            let mut signals = match Signals::new(SignalKind::ALL.map(SignalKind::as_raw)) {
                Ok(signals) => signals,
                Err(e) => {
                    tracing::warn!(subscription = id, error = %e, "Failed to register signal handlers");
                    return Self {
                        id,
                        handle: None,
                        dispatcher: Mutex::new(None),
                    };
                }
            };
            let handle = signals.handle();

            let dispatcher = std::thread::Builder::new()
                .name(format!("sigctx-signals-{}", id))
                .spawn(move || {
                    for raw in signals.forever() {
                        if let Some(kind) = SignalKind::from_raw(raw) {
                            tracing::info!(signal = %kind, subscription = id, "Termination signal received");
                            notify(kind);
                        }
                    }
                });
            let dispatcher = match dispatcher {
                Ok(thread) => Some(thread),
                Err(e) => {
                    tracing::warn!(subscription = id, error = %e, "Failed to start signal dispatcher");
                    handle.close();
                    return Self {
                        id,
                        handle: None,
                        dispatcher: Mutex::new(None),
                    };
                }
            };

            armed.store(false, Ordering::SeqCst);
            tracing::debug!(subscription = id, "Signal subscription registered");
            Self {
                id,
                handle: Some(handle),
                dispatcher: Mutex::new(dispatcher),
            }
        }

        pub(super) fn id(&self) -> u64 {
            self.id
        }

        pub(super) fn close(&self) {
            default_action().store(true, Ordering::SeqCst);

            if let Some(handle) = &self.handle {
                handle.close();
            }
            let dispatcher = self
                .dispatcher
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(thread) = dispatcher {
                if thread.thread().id() != std::thread::current().id() {
                    let _ = thread.join();
                }
            }
            tracing::debug!(subscription = self.id, "Signal subscription released");
        }
    }
}

#[cfg(not(unix))]
mod platform {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::SignalKind;

    static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

    pub(super) fn default_handling_active() -> bool {
        true
    }

    pub(super) struct Registration {
        id: u64,
    }

    impl Registration {
        pub(super) fn new<F>(_notify: F) -> Self
        where
            F: Fn(SignalKind) + Send + Sync + 'static,
        {
            tracing::debug!("Signal interception is not supported on this platform");
            Self {
                id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
            }
        }

        pub(super) fn id(&self) -> u64 {
            self.id
        }

        pub(super) fn close(&self) {}
    }
}
