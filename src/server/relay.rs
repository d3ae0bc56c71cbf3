//! Chat relay
//!
//! Applies the per-connection transition table and fans resulting events out
//! through the registry.
//!
//! | phase      | request       | result                                   |
//! |------------|---------------|------------------------------------------|
//! | Connecting | `setUsername` | claim; broadcast join + presence         |
//! | Connecting | `setUsername` | name held: private rejection             |
//! | Connecting | `message`     | ignored                                  |
//! | Identified | `message`     | broadcast chat line                      |
//! | Identified | `setUsername` | ignored                                  |
//! | any        | close         | if identified: release; leave + presence |
//!
//! Every mutate-then-broadcast step runs under one sequencer lock, so all
//! recipients see events in the same order and timestamps never go backwards
//! in that order. Sends inside the lock never wait on a peer.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::protocol::constants::{EMPTY_NAME_NOTICE, NAME_TAKEN_NOTICE};
use crate::protocol::message::normalize_username;
use crate::protocol::{ClientRequest, FrameError, ServerEvent};
use crate::registry::{BroadcastOutcome, ConnectionHandle, ConnectionRegistry};
use crate::session::SessionState;
use crate::stats::RelayStats;

/// What a single inbound frame did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Name claimed; join and presence broadcast
    Joined { name: String },
    /// Name held by someone else; requester notified privately
    NameTaken,
    /// Name blank after trimming; requester notified privately
    EmptyName,
    /// Session already has a name
    AlreadyIdentified,
    /// Chat line broadcast
    Relayed { delivered: usize },
    /// Chat from an unidentified session
    Ignored,
    /// Frame was not a recognized request
    Discarded,
}

/// Receipt clock for outbound events
///
/// Wall-clock milliseconds, clamped so a step back in system time never
/// produces an earlier timestamp than one already sent.
#[derive(Debug, Default)]
pub(crate) struct EventClock {
    last: i64,
}

impl EventClock {
    pub(crate) fn tick(&mut self) -> i64 {
        self.tick_at(chrono::Utc::now().timestamp_millis())
    }

    pub(crate) fn tick_at(&mut self, now: i64) -> i64 {
        self.last = self.last.max(now);
        self.last
    }
}

/// Shared relay state, one per server
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
    sequencer: Mutex<EventClock>,
}

impl Relay {
    /// Create a relay with an empty registry
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ConnectionRegistry::new()))
    }

    /// Create a relay over an existing registry
    pub fn with_registry(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            stats: Arc::new(RelayStats::new()),
            sequencer: Mutex::new(EventClock::default()),
        }
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get a reference to the relay statistics
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Parse and apply one text frame
    pub async fn dispatch(
        &self,
        session: &mut SessionState,
        handle: &ConnectionHandle,
        text: &str,
    ) -> DispatchOutcome {
        session.frames_received += 1;

        match ClientRequest::parse(text) {
            Ok(request) => self.handle_request(session, handle, request).await,
            Err(e) => self.discard(session, &e),
        }
    }

    /// Apply a parsed request
    pub async fn handle_request(
        &self,
        session: &mut SessionState,
        handle: &ConnectionHandle,
        request: ClientRequest,
    ) -> DispatchOutcome {
        tracing::trace!(session_id = session.id, request = request.kind(), "Dispatching");

        match request {
            ClientRequest::SetUsername { username } => {
                self.set_username(session, handle, &username).await
            }
            ClientRequest::Message { content } => self.relay_chat(session, content).await,
        }
    }

    /// Record a malformed frame; the session is left as it was
    pub fn discard(&self, session: &mut SessionState, error: &FrameError) -> DispatchOutcome {
        session.frames_discarded += 1;
        self.stats.frame_malformed();

        tracing::warn!(
            session_id = session.id,
            peer = %session.peer_addr,
            error = %error,
            "Discarding malformed frame"
        );

        DispatchOutcome::Discarded
    }

    async fn set_username(
        &self,
        session: &mut SessionState,
        handle: &ConnectionHandle,
        requested: &str,
    ) -> DispatchOutcome {
        if let Some(current) = session.username() {
            tracing::debug!(
                session_id = session.id,
                user = current,
                requested = requested,
                "Ignoring rename of identified session"
            );
            return DispatchOutcome::AlreadyIdentified;
        }

        let mut clock = self.sequencer.lock().await;

        let Some(name) = normalize_username(requested) else {
            self.stats.name_rejected();
            self.send_private(handle, ServerEvent::system(EMPTY_NAME_NOTICE, clock.tick()));
            return DispatchOutcome::EmptyName;
        };

        if self.registry.claim(name, handle.clone()).await.is_err() {
            self.stats.name_rejected();
            tracing::info!(session_id = session.id, user = name, "Username already taken");
            self.send_private(handle, ServerEvent::system(NAME_TAKEN_NOTICE, clock.tick()));
            return DispatchOutcome::NameTaken;
        }

        session.identify(name);

        self.broadcast(ServerEvent::joined(name, clock.tick())).await;
        let users = self.registry.snapshot().await;
        self.broadcast(ServerEvent::user_list(users, clock.tick())).await;

        DispatchOutcome::Joined {
            name: name.to_string(),
        }
    }

    async fn relay_chat(&self, session: &SessionState, content: String) -> DispatchOutcome {
        let Some(user) = session.username() else {
            tracing::debug!(session_id = session.id, "Ignoring chat from unidentified session");
            return DispatchOutcome::Ignored;
        };

        let mut clock = self.sequencer.lock().await;
        let outcome = self
            .broadcast(ServerEvent::chat(user, content, clock.tick()))
            .await;
        self.stats.message_relayed();

        DispatchOutcome::Relayed {
            delivered: outcome.delivered,
        }
    }

    /// Run close side effects for a session
    ///
    /// Releases the name and broadcasts leave + presence if the session was
    /// identified. Returns whether anything was released. Safe to call more
    /// than once.
    pub async fn disconnect(&self, session: &mut SessionState) -> bool {
        let Some(name) = session.close() else {
            return false;
        };

        let mut clock = self.sequencer.lock().await;

        if !self.registry.release(&name, session.id).await {
            return false;
        }

        self.broadcast(ServerEvent::left(&name, clock.tick())).await;
        let users = self.registry.snapshot().await;
        self.broadcast(ServerEvent::user_list(users, clock.tick())).await;

        true
    }

    /// Encode once and queue for every present connection
    async fn broadcast(&self, event: ServerEvent) -> BroadcastOutcome {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(event = event.kind(), error = %e, "Failed to encode event");
                return BroadcastOutcome::default();
            }
        };

        let outcome = self.registry.broadcast(&frame).await;
        self.stats.deliveries_dropped(outcome.dropped);

        tracing::debug!(
            event = event.kind(),
            user = event.user(),
            recipients = outcome.delivered,
            dropped = outcome.dropped,
            "Broadcast event"
        );

        outcome
    }

    fn send_private(&self, handle: &ConnectionHandle, event: ServerEvent) {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(event = event.kind(), error = %e, "Failed to encode event");
                return;
            }
        };

        if let Err(e) = handle.send(frame) {
            self.stats.deliveries_dropped(1);
            tracing::debug!(
                session_id = handle.session_id,
                error = %e,
                "Failed to send private notice"
            );
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::OutboundFrame;
    use crate::session::SessionPhase;

    struct TestClient {
        state: SessionState,
        handle: ConnectionHandle,
        rx: mpsc::Receiver<OutboundFrame>,
    }

    impl TestClient {
        fn new(id: u64) -> Self {
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50000 + id as u16);
            let (handle, rx) = ConnectionHandle::channel(id, addr, 32);
            Self {
                state: SessionState::new(id, addr),
                handle,
                rx,
            }
        }

        async fn send(&mut self, relay: &Relay, text: &str) -> DispatchOutcome {
            relay.dispatch(&mut self.state, &self.handle, text).await
        }

        async fn join(&mut self, relay: &Relay, name: &str) -> DispatchOutcome {
            let frame = format!(r#"{{"type":"setUsername","username":"{}"}}"#, name);
            self.send(relay, &frame).await
        }

        async fn chat(&mut self, relay: &Relay, content: &str) -> DispatchOutcome {
            let frame = format!(r#"{{"type":"message","content":"{}"}}"#, content);
            self.send(relay, &frame).await
        }

        /// Everything queued so far
        fn drain(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                events.push(serde_json::from_str(frame.as_str()).unwrap());
            }
            events
        }
    }

    #[tokio::test]
    async fn test_join_broadcasts_notice_and_presence() {
        let relay = Relay::new();
        let mut alice = TestClient::new(1);

        let outcome = alice.join(&relay, "alice").await;

        assert_eq!(outcome, DispatchOutcome::Joined { name: "alice".into() });
        assert_eq!(alice.state.phase, SessionPhase::Identified);

        let events = alice.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), "system");
        assert_eq!(events[0].user(), "System");
        assert_eq!(events[0].content(), "alice joined the chat");
        assert_eq!(events[1].users(), Some(&["alice".to_string()][..]));
    }

    #[tokio::test]
    async fn test_join_trims_name() {
        let relay = Relay::new();
        let mut alice = TestClient::new(1);

        alice.join(&relay, "  alice  ").await;

        assert_eq!(alice.state.username(), Some("alice"));
        assert_eq!(relay.registry().snapshot().await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_name_taken_is_private() {
        let relay = Relay::new();
        let mut alice = TestClient::new(1);
        let mut other = TestClient::new(2);
        alice.join(&relay, "alice").await;
        alice.drain();

        // Trimmed before comparison, so this collides
        let outcome = other.join(&relay, " alice ").await;

        assert_eq!(outcome, DispatchOutcome::NameTaken);
        assert_eq!(other.state.phase, SessionPhase::Connecting);
        assert!(alice.drain().is_empty());

        let events = other.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "system");
        assert_eq!(events[0].content(), "Username already taken");
        assert_eq!(relay.stats().snapshot().names_rejected, 1);
    }

    #[tokio::test]
    async fn test_empty_name_rejected_privately() {
        let relay = Relay::new();
        let mut blank = TestClient::new(1);

        let outcome = blank.join(&relay, "   ").await;

        assert_eq!(outcome, DispatchOutcome::EmptyName);
        assert_eq!(blank.state.phase, SessionPhase::Connecting);
        assert!(relay.registry().is_empty().await);

        let events = blank.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content(), "Username cannot be empty");
    }

    #[tokio::test]
    async fn test_unidentified_chat_ignored() {
        let relay = Relay::new();
        let mut alice = TestClient::new(1);
        let mut lurker = TestClient::new(2);
        alice.join(&relay, "alice").await;
        alice.drain();

        let outcome = lurker.chat(&relay, "hello?").await;

        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert!(alice.drain().is_empty());
        assert!(lurker.drain().is_empty());
        assert_eq!(relay.stats().snapshot().messages_relayed, 0);
    }

    #[tokio::test]
    async fn test_chat_reaches_identified_only() {
        let relay = Relay::new();
        let mut alice = TestClient::new(1);
        let mut bob = TestClient::new(2);
        let mut lurker = TestClient::new(3);
        alice.join(&relay, "alice").await;
        bob.join(&relay, "bob").await;
        alice.drain();
        bob.drain();

        let outcome = alice.chat(&relay, " hi bob ").await;

        assert_eq!(outcome, DispatchOutcome::Relayed { delivered: 2 });
        for client in [&mut alice, &mut bob] {
            let events = client.drain();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].kind(), "message");
            assert_eq!(events[0].user(), "alice");
            assert_eq!(events[0].content(), " hi bob ");
        }
        assert!(lurker.drain().is_empty());
    }

    #[tokio::test]
    async fn test_rename_ignored() {
        let relay = Relay::new();
        let mut alice = TestClient::new(1);
        alice.join(&relay, "alice").await;
        alice.drain();

        let outcome = alice.join(&relay, "mallory").await;

        assert_eq!(outcome, DispatchOutcome::AlreadyIdentified);
        assert_eq!(alice.state.username(), Some("alice"));
        assert_eq!(relay.registry().snapshot().await, vec!["alice"]);
        assert!(alice.drain().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frame_discarded() {
        let relay = Relay::new();
        let mut alice = TestClient::new(1);

        assert_eq!(alice.send(&relay, "not json").await, DispatchOutcome::Discarded);
        assert_eq!(
            alice.send(&relay, r#"{"type":"ban","username":"x"}"#).await,
            DispatchOutcome::Discarded
        );

        assert_eq!(alice.state.phase, SessionPhase::Connecting);
        assert_eq!(alice.state.frames_received, 2);
        assert_eq!(alice.state.frames_discarded, 2);
        assert_eq!(relay.stats().snapshot().frames_malformed, 2);

        // Still usable afterwards
        assert!(matches!(
            alice.join(&relay, "alice").await,
            DispatchOutcome::Joined { .. }
        ));
    }

    #[tokio::test]
    async fn test_disconnect_identified() {
        let relay = Relay::new();
        let mut alice = TestClient::new(1);
        let mut bob = TestClient::new(2);
        alice.join(&relay, "alice").await;
        bob.join(&relay, "bob").await;
        bob.drain();

        assert!(relay.disconnect(&mut alice.state).await);

        let events = bob.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].content(), "alice left the chat");
        assert_eq!(events[1].users(), Some(&["bob".to_string()][..]));
        assert!(!relay.registry().contains("alice").await);

        // Second close is a no-op
        assert!(!relay.disconnect(&mut alice.state).await);
        assert!(bob.drain().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_unidentified() {
        let relay = Relay::new();
        let mut alice = TestClient::new(1);
        let mut lurker = TestClient::new(2);
        alice.join(&relay, "alice").await;
        alice.drain();

        assert!(!relay.disconnect(&mut lurker.state).await);

        assert!(lurker.state.is_closed());
        assert!(alice.drain().is_empty());
    }

    #[tokio::test]
    async fn test_name_reusable_after_leave() {
        let relay = Relay::new();
        let mut first = TestClient::new(1);
        let mut second = TestClient::new(2);

        first.join(&relay, "alice").await;
        relay.disconnect(&mut first.state).await;

        assert!(matches!(
            second.join(&relay, "alice").await,
            DispatchOutcome::Joined { .. }
        ));
    }

    #[tokio::test]
    async fn test_broken_recipient_does_not_block_others() {
        let relay = Relay::new();
        let mut alice = TestClient::new(1);
        let mut bob = TestClient::new(2);
        let mut carol = TestClient::new(3);
        alice.join(&relay, "alice").await;
        bob.join(&relay, "bob").await;
        carol.join(&relay, "carol").await;
        alice.drain();
        carol.drain();

        // bob's writer is gone but his session has not closed yet
        let TestClient { rx, .. } = bob;
        drop(rx);

        let outcome = alice.chat(&relay, "anyone there").await;

        assert_eq!(outcome, DispatchOutcome::Relayed { delivered: 2 });
        assert_eq!(alice.drain().len(), 1);
        assert_eq!(carol.drain().len(), 1);
        assert_eq!(relay.stats().snapshot().deliveries_dropped, 1);
    }

    #[tokio::test]
    async fn test_racing_claims_single_winner() {
        let relay = Arc::new(Relay::new());
        let mut tasks = Vec::new();

        for id in 1..=2 {
            let relay = Arc::clone(&relay);
            tasks.push(tokio::spawn(async move {
                let mut client = TestClient::new(id);
                let outcome = client.join(&relay, "bob").await;
                (outcome, client)
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }

        let winners = results
            .iter()
            .filter(|(o, _)| matches!(o, DispatchOutcome::Joined { .. }))
            .count();
        assert_eq!(winners, 1);

        for (outcome, client) in results.iter_mut() {
            if *outcome == DispatchOutcome::NameTaken {
                assert_eq!(client.state.phase, SessionPhase::Connecting);
                let events = client.drain();
                assert!(events.iter().all(|e| e.content() == "Username already taken"));
                assert!(!events.is_empty());
            }
        }
        assert_eq!(relay.registry().snapshot().await, vec!["bob"]);
    }

    #[tokio::test]
    async fn test_timestamps_non_decreasing() {
        let relay = Relay::new();
        let mut alice = TestClient::new(1);
        alice.join(&relay, "alice").await;
        for i in 0..20 {
            alice.chat(&relay, &format!("line {}", i)).await;
        }

        let stamps: Vec<i64> = alice.drain().iter().map(|e| e.timestamp()).collect();

        assert_eq!(stamps.len(), 22);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_event_clock_clamps_backwards_time() {
        let mut clock = EventClock::default();

        assert_eq!(clock.tick_at(100), 100);
        assert_eq!(clock.tick_at(90), 100);
        assert_eq!(clock.tick_at(150), 150);
    }

    #[tokio::test]
    async fn test_zed_scenario() {
        let relay = Relay::new();
        let mut a = TestClient::new(1);
        let mut b = TestClient::new(2);

        a.join(&relay, "zed").await;
        let events = a.drain();
        assert_eq!(events[0].content(), "zed joined the chat");
        assert_eq!(events[1].users(), Some(&["zed".to_string()][..]));

        // B collides: private rejection, no presence broadcast anywhere
        b.join(&relay, "zed").await;
        let events = b.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content(), "Username already taken");
        assert!(a.drain().is_empty());

        b.join(&relay, "zed2").await;
        a.drain();
        b.drain();

        a.chat(&relay, "hi").await;
        for client in [&mut a, &mut b] {
            let events = client.drain();
            assert_eq!(events.len(), 1);
            assert_eq!(
                (events[0].kind(), events[0].user(), events[0].content()),
                ("message", "zed", "hi")
            );
        }
    }
}
