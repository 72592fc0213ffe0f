//! Fastsync server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on all interfaces, port 8080
//! fastsync-server --bind 0.0.0.0:8080
//!
//! # Log joins, leaves, and buffer resizes; evict rooms once empty
//! fastsync-server --debug --evict-empty-rooms
//! ```

use std::time::Duration;

use clap::Parser;
use fastsync_server::{DriverConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Fastsync room relay server
#[derive(Parser, Debug)]
#[command(name = "fastsync-server")]
#[command(about = "Room-based WebSocket state relay server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Log join, leave, and buffer resize events
    #[arg(short, long)]
    debug: bool,

    /// Milliseconds between liveness probes
    #[arg(long, default_value = "5000")]
    heartbeat_ms: u64,

    /// Room buffer flushes per second
    #[arg(long, default_value = "30")]
    sync_hz: u32,

    /// Remove rooms from the directory once their last member leaves
    #[arg(long)]
    evict_empty_rooms: bool,

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

    tracing::info!("Fastsync server starting");
    tracing::info!("Binding to {}", args.bind);

    if args.sync_hz == 0 {
        return Err("--sync-hz must be at least 1".into());
    }

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        driver: DriverConfig {
            debug: args.debug,
            heartbeat_interval: Duration::from_millis(args.heartbeat_ms),
            sync_interval: Duration::from_secs(1) / args.sync_hz,
            evict_empty_rooms: args.evict_empty_rooms,
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
