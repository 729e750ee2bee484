//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → signal-hook Signals → dispatcher thread → subscriber
//!
//! Context (context.rs):
//!     parent cancelled | signal | release → latch fires once (with reason)
//!
//! Serve (serve.rs):
//!     start server → wait on context → restore default signals
//!     → shutdown(now + grace period) → report
//! ```
//!
//! # Design Decisions
//! - One latch per sequence; first reason wins
//! - Restoring default handling makes a second Ctrl+C a forced exit
//! - Shutdown has a deadline: the sequencer never waits past it

pub mod context;
pub mod grace;
pub mod serve;
pub mod signals;

pub use context::{derive_shutdown_context, new_shutdown_context, Release, ShutdownContext, ShutdownReason};
pub use grace::{set_shutdown_grace_period, shutdown_grace_period, DEFAULT_SHUTDOWN_GRACE_PERIOD};
pub use serve::{serve, serve_with, ServeError, ServeOutcome, Server};
pub use signals::{default_handling_active, SignalKind, SignalSubscription};
