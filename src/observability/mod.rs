//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!
//! Consumers:
//!     → logging.rs (fmt layer, pretty or JSON, to stdout)
//! ```

pub mod logging;

pub use logging::init_logging;
