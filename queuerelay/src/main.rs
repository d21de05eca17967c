//! queuerelay - HTTP ingress and queue consumers
//!
//! Accepts messages over HTTP, publishes them to a queue, and consumes the
//! main and dead-letter queues in the background until SIGINT or SIGTERM.

use clap::Parser;
use queuerelay::{signal, Config, Relay};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "queuerelay")]
#[command(about = "HTTP ingress and queue consumers", long_about = None)]
struct Args {
    /// Configuration file (defaults to ./queuerelay.toml when present)
    #[arg(short, long, env = "QUEUERELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "QUEUERELAY_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "QUEUERELAY_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "QUEUERELAY_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("queuerelay={},tower_http=debug", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("Starting queuerelay...");
    info!("  Backend: {:?}", config.queue.backend);
    info!("  Queue endpoint: {}", config.queue.queue_endpoint);
    info!(
        "  Dead-letter routing: {:?}",
        config.consumer.dead_letter_routing
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let token = CancellationToken::new();
    tokio::spawn(signal::cancel_on_signal(token.clone()));

    let relay = Relay::connect(config).await?;
    relay.run(listener, token).await?;

    Ok(())
}
