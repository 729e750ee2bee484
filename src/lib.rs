//! Graceful shutdown coordination for long-running servers.
//!
//! A [`ShutdownContext`] becomes done when SIGINT or SIGTERM arrives (or its
//! owner releases it), and [`serve`] uses it to start a [`Server`], wait for a
//! termination request, restore default signal handling, and shut the server
//! down within the grace period.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::{
    derive_shutdown_context, new_shutdown_context, serve, serve_with, set_shutdown_grace_period,
    shutdown_grace_period, Release, ServeError, ServeOutcome, Server, ShutdownContext,
    ShutdownReason, SignalKind,
};
