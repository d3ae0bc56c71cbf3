//! Chat relay listener
//!
//! Accepts WebSocket upgrades on `/` and spawns a connection handler per
//! viewer.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::registry::ConnectionRegistry;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::relay::Relay;
use crate::stats::RelayStats;

/// State shared by every upgrade request
#[derive(Clone)]
struct AppState {
    relay: Arc<Relay>,
    next_session_id: Arc<AtomicU64>,
    connection_semaphore: Option<Arc<Semaphore>>,
    send_queue_capacity: usize,
    max_message_size: usize,
}

/// Chat relay server
pub struct RelayServer {
    config: ServerConfig,
    state: AppState,
}

impl RelayServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let state = AppState {
            relay: Arc::new(Relay::new()),
            next_session_id: Arc::new(AtomicU64::new(1)),
            connection_semaphore,
            send_queue_capacity: config.send_queue_capacity,
            max_message_size: config.max_message_size,
        };

        Self { config, state }
    }

    /// Get a reference to the relay
    pub fn relay(&self) -> &Arc<Relay> {
        &self.state.relay
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.state.relay.registry()
    }

    /// Get a reference to the relay statistics
    pub fn stats(&self) -> &Arc<RelayStats> {
        self.state.relay.stats()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(handle_upgrade))
            .with_state(self.state.clone())
    }

    /// Bind and serve in the background
    ///
    /// Returns the bound address (useful with port 0) and the serving task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Chat relay listening");

        let app = self.router();
        let stats = report_stats(Arc::clone(&self.state.relay), self.config.stats_interval);

        // The reporter lives inside the serving task, so aborting the handle
        // stops both
        let handle = tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            tokio::select! {
                result = axum::serve(listener, service).into_future() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Chat relay stopped");
                    }
                }
                _ = stats => {}
            }
        });

        Ok((addr, handle))
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Chat relay listening");

        let stats = report_stats(Arc::clone(&self.state.relay), self.config.stats_interval);
        let service = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = axum::serve(listener, service).into_future() => result.map_err(Into::into),
            _ = stats => Ok(()),
        }
    }
}

/// Log a stats line every `interval`
///
/// Never completes; a zero interval disables reporting.
async fn report_stats(relay: Arc<Relay>, interval: Duration) {
    if interval.is_zero() {
        return std::future::pending().await;
    }

    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let stats = relay.stats().snapshot();
        let present = relay.registry().len().await;
        tracing::info!(
            active = stats.connections_active,
            accepted = stats.connections_accepted,
            present = present,
            relayed = stats.messages_relayed,
            malformed = stats.frames_malformed,
            rejected = stats.names_rejected,
            dropped = stats.deliveries_dropped,
            uptime_secs = stats.uptime.as_secs(),
            "Relay stats"
        );
    }
}

async fn handle_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    // Check connection limit
    let permit = match state.connection_semaphore {
        Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
            }
        },
        None => None,
    };

    let session_id = state.next_session_id.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(session_id = session_id, peer = %peer_addr, "New connection");

    let relay = state.relay;
    let queue_capacity = state.send_queue_capacity;

    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            // Held for the lifetime of the connection
            let _permit = permit;
            Connection::new(session_id, peer_addr, relay, queue_capacity)
                .run(socket)
                .await;
        })
}
