//! Request security gateway
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ request id / trace / security headers
//!                    │
//!                    ▼
//!              ┌─────────────┐    ┌──────────┐
//!              │ rate limit  │───▶│   CSRF   │──┐
//!              └─────────────┘    └──────────┘  │
//!                                               ▼
//!                                      ┌──────────────┐    ┌────────────┐
//!                                      │ route table  │───▶│ auth gate  │
//!                                      └──────────────┘    └─────┬──────┘
//!                                                                │
//!     Client Response                                            ▼
//!     ◀───────────── security headers ◀──────────────────── upstream app
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use request_gateway::lifecycle::signals::wait_for_signal;
use request_gateway::lifecycle::startup::{build_app, parse_address, resolve_config};
use request_gateway::observability::{logging, metrics};
use request_gateway::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "request-gateway", version, about = "Request security gateway")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = resolve_config(args.config.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        "request-gateway starting"
    );

    if config.observability.metrics_enabled {
        let addr = parse_address("metrics", &config.observability.metrics_address)?;
        metrics::init_metrics(addr);
    }

    let bind_address = config.listener.bind_address.clone();
    let app = build_app(config)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(wait_for_signal(shutdown));

    HttpServer::new(app).run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
