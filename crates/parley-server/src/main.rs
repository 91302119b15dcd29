//! Parley server binary.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: port 7667, 10s ping interval, 5s pong window, 3 misses
//! parley-server --bind 0.0.0.0:7667
//!
//! # Impatient liveness policy
//! parley-server --ping-interval 2 --pong-wait 1 --max-missed 2
//! ```

use std::time::Duration;

use clap::Parser;
use parley_server::{HeartbeatConfig, Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley chat protocol server
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(about = "Parley line-based chat protocol server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:7667")]
    bind: String,

    /// Seconds between heartbeat pings
    #[arg(long, default_value = "10")]
    ping_interval: u64,

    /// Seconds to wait for a pong after each ping
    #[arg(long, default_value = "5")]
    pong_wait: u64,

    /// Consecutive missed heartbeats before a session is dropped
    #[arg(long, default_value = "3")]
    max_missed: u32,

    /// Hard cap on incoming line length, in bytes
    #[arg(long, default_value = "512")]
    max_line_length: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Parley server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerConfig {
        bind_address: args.bind,
        max_line_length: args.max_line_length,
        heartbeat: HeartbeatConfig {
            ping_interval: Duration::from_secs(args.ping_interval),
            pong_wait: Duration::from_secs(args.pong_wait),
            max_missed: args.max_missed,
        },
    };

    let server = Server::bind(config).await?;

    server.run().await?;

    Ok(())
}
