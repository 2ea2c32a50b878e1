//! Config-driven endpoint server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::listener ──▶ http::server ──▶ dispatch::Dispatcher
//!                     (limits,          (hyper, body      (context phases,
//!                      deny list)        frames)           routing, handler)
//!                                                                │
//!     Client Response                                            ▼
//!     ◀────────────── http::server ◀── Materialized ◀── configured handler
//!                     (buffer/file)                      (text or file)
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use endpoint_dispatch::config::{load_config, validate_config, ConfigError, ServerConfig};
use endpoint_dispatch::dispatch::configured::register_routes;
use endpoint_dispatch::lifecycle::{wait_for_signal, Shutdown};
use endpoint_dispatch::net::listener::Listener;
use endpoint_dispatch::observability::{init_logging, metrics};
use endpoint_dispatch::{Dispatcher, HttpServer};

#[derive(Parser)]
#[command(name = "endpoint-dispatch")]
#[command(about = "Serve configured endpoints over HTTP/1.1", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
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
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    init_logging(&config.observability)?;
    tracing::info!("endpoint-dispatch v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let dispatcher = register_routes(Dispatcher::builder(), &config.routes)?.build();

    let listener = Listener::bind(&config.listener).await?;
    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    HttpServer::new(Arc::new(dispatcher), &config)
        .run(listener, shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
