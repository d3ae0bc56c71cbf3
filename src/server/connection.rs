//! Per-connection handler
//!
//! Drives one WebSocket from upgrade to close. Inbound frames are dispatched
//! in order on the connection task; outbound frames are drained from the
//! connection's queue by a separate writer task so a slow socket never holds
//! up a broadcaster.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol::FrameError;
use crate::registry::{ConnectionHandle, OutboundFrame};
use crate::server::relay::Relay;
use crate::session::SessionState;

/// A single viewer connection
pub struct Connection {
    state: SessionState,
    handle: ConnectionHandle,
    outbound: mpsc::Receiver<OutboundFrame>,
    relay: Arc<Relay>,
}

impl Connection {
    /// Create a connection with its own outbound queue
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        relay: Arc<Relay>,
        queue_capacity: usize,
    ) -> Self {
        let (handle, outbound) = ConnectionHandle::channel(session_id, peer_addr, queue_capacity);

        Self {
            state: SessionState::new(session_id, peer_addr),
            handle,
            outbound,
            relay,
        }
    }

    /// Run until the transport closes
    ///
    /// Close, read error and writer failure all end here and run the same
    /// release path, so a name never outlives its socket.
    pub async fn run(self, socket: WebSocket) {
        let Connection {
            mut state,
            handle,
            outbound,
            relay,
        } = self;

        let session_id = state.id;
        let (ws_sender, mut ws_receiver) = socket.split();

        relay.stats().connection_opened();
        tracing::info!(session_id = session_id, peer = %state.peer_addr, "Viewer connected");

        let mut writer = tokio::spawn(write_loop(session_id, ws_sender, outbound));

        loop {
            tokio::select! {
                _ = &mut writer => {
                    tracing::debug!(session_id = session_id, "Writer stopped");
                    break;
                }
                frame = ws_receiver.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let outcome = relay.dispatch(&mut state, &handle, text.as_str()).await;
                        tracing::trace!(session_id = session_id, ?outcome, "Frame handled");
                    }
                    Some(Ok(Message::Binary(data))) => {
                        state.frames_received += 1;
                        relay.discard(&mut state, &FrameError::Binary(data.len()));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Ping/Pong are answered by axum
                    }
                    Some(Err(e)) => {
                        tracing::debug!(session_id = session_id, error = %e, "Transport error");
                        break;
                    }
                }
            }
        }

        let user = state.username().map(str::to_owned);
        relay.disconnect(&mut state).await;

        drop(handle);
        writer.abort();
        relay.stats().connection_closed();

        tracing::info!(
            session_id = session_id,
            user = user.as_deref().unwrap_or("-"),
            frames = state.frames_received,
            discarded = state.frames_discarded,
            duration_ms = state.duration().as_millis() as u64,
            "Viewer disconnected"
        );
    }
}

async fn write_loop(
    session_id: u64,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = sink.send(Message::Text(frame)).await {
            tracing::debug!(session_id = session_id, error = %e, "Write failed");
            return;
        }
    }

    let _ = sink.close().await;
}
