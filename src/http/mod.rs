//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → handlers (greeting, health)
//!     → Send to client
//!
//! Shutdown request
//!     → server.rs stops accepting, drains connections, reports Stopped
//! ```

pub mod server;

pub use server::HttpServer;
