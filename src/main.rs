//! sigctx HTTP server.
//!
//! Serves HTTP until SIGINT or SIGTERM, then drains in-flight requests for up
//! to the configured grace period. A second Ctrl+C during the grace period
//! exits immediately.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use sigctx::config::{load_config, validate_config, ConfigError, ServerConfig};
use sigctx::http::HttpServer;
use sigctx::lifecycle::{serve, set_shutdown_grace_period};
use sigctx::observability::init_logging;

#[derive(Parser)]
#[command(name = "sigctx-server")]
#[command(about = "HTTP server with graceful shutdown on SIGINT/SIGTERM", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override shutdown.grace_period_secs.
    #[arg(long)]
    grace_period_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(secs) = cli.grace_period_secs {
        config.shutdown.grace_period_secs = secs;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    init_logging(&config.observability);

    tracing::info!("sigctx-server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        grace_period_secs = config.shutdown.grace_period_secs,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    set_shutdown_grace_period(config.shutdown.grace_period());

    let server = Arc::new(HttpServer::new(config));
    serve(server).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
