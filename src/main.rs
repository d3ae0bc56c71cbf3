//! Chat relay server binary
//!
//! Run with: live-chat-relay [--bind ADDR] [--max-connections N]
//!
//! Examples:
//!   live-chat-relay                           # binds to 0.0.0.0:3001
//!   live-chat-relay --bind 127.0.0.1:4000     # binds to 127.0.0.1:4000
//!   RUST_LOG=live_chat_relay=debug live-chat-relay
//!
//! Clients connect with a WebSocket to `ws://HOST:PORT/` and send
//! `{"type":"setUsername","username":"..."}` followed by
//! `{"type":"message","content":"..."}` frames.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use live_chat_relay::{RelayServer, ServerConfig};

/// WebSocket chat relay for live stream viewers
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "CHAT_RELAY_BIND", default_value = "0.0.0.0:3001")]
    bind: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, env = "CHAT_RELAY_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,

    /// Outbound frames buffered per viewer before drops begin
    #[arg(long, env = "CHAT_RELAY_QUEUE_CAPACITY", default_value_t = 64)]
    queue_capacity: usize,

    /// Seconds between stats log lines (0 disables)
    #[arg(long, env = "CHAT_RELAY_STATS_INTERVAL", default_value_t = 60)]
    stats_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::with_addr(args.bind)
        .max_connections(args.max_connections)
        .send_queue_capacity(args.queue_capacity)
        .stats_interval(Duration::from_secs(args.stats_interval));

    let server = RelayServer::new(config);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Shutting down");
    Ok(())
}
