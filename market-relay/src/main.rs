use anyhow::Context;
use market_relay::{DeribitOrderBookFetcher, Relay, RelayConfig};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_help() {
    eprintln!(
        r#"Market Data Relay - periodic order book snapshots over WebSocket

USAGE:
    market-relay [OPTIONS]

OPTIONS:
    --config <PATH>     Load configuration from JSON file
    --help              Print this help message

ENVIRONMENT VARIABLES:
    HOST                Server host (overrides config, default: 0.0.0.0)
    PORT                Server port (overrides config, default: 9002)
    RUST_LOG            Log level filter

EXAMPLES:
    # Run with defaults
    market-relay

    # Run with config file
    market-relay --config relay.json

    # Run with custom port
    PORT=9100 market-relay

CLIENT PROTOCOL:
    -> {{"action":"subscribe","symbol":"BTC-PERPETUAL"}}
    -> {{"action":"unsubscribe","symbol":"BTC-PERPETUAL"}}
    <- {{"symbol":"BTC-PERPETUAL","data":{{...}},"timestamp":1700000000000}}
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = Some(args[i].clone());
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            RelayConfig::from_file(&path)?
        }
        None => {
            tracing::info!("Using default configuration");
            RelayConfig::default()
        }
    };

    if let Ok(host) = std::env::var("HOST") {
        config.server.host = host;
    }
    if let Ok(port) = std::env::var("PORT") {
        config.server.port = port
            .parse()
            .with_context(|| format!("invalid PORT value: {}", port))?;
    }
    config.validate()?;

    let fetcher = DeribitOrderBookFetcher::new(&config.fetcher, Handle::current())
        .context("failed to build order book fetcher")?;

    tracing::info!("Starting Market Data Relay");
    tracing::info!(
        "WebSocket: ws://{}:{}/ws",
        config.server.host,
        config.server.port
    );
    tracing::info!(
        "Health: http://{}:{}/health",
        config.server.host,
        config.server.port
    );
    tracing::info!(
        interval_ms = config.broadcast.interval_ms,
        workers = config.broadcast.workers,
        overlap = ?config.broadcast.overlap,
        source = %fetcher.base_url(),
        "Broadcast settings"
    );

    let relay = Relay::new(config, Arc::new(fetcher))?;
    relay.run(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
