//! Connection registry implementation
//!
//! The central registry that tracks identified connections and fans out
//! frames to them.

use indexmap::IndexMap;
use tokio::sync::RwLock;

use super::entry::{ConnectionHandle, OutboundFrame};
use super::error::{DeliveryError, RegistryError};

/// Result of a single broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Recipients whose queue accepted the frame
    pub delivered: usize,
    /// Recipients skipped because their queue was full or closed
    pub dropped: usize,
}

/// Central registry of identified connections
///
/// Thread-safe via `RwLock`. Claims and releases take the write lock, so they
/// are serialized against each other and against every read. Iteration for
/// broadcast happens over a copy taken under the read lock.
pub struct ConnectionRegistry {
    /// Display name to handle, in claim order
    entries: RwLock<IndexMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
        }
    }

    /// Claim a display name for a connection
    ///
    /// Fails without changing anything if another present connection holds
    /// the name. The registry never broadcasts on its own; the caller decides
    /// who to notify.
    pub async fn claim(&self, name: &str, handle: ConnectionHandle) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(name) {
            tracing::debug!(
                user = name,
                holder = existing.session_id,
                requester = handle.session_id,
                "Name claim rejected"
            );
            return Err(RegistryError::NameTaken(name.to_string()));
        }

        tracing::info!(
            user = name,
            session_id = handle.session_id,
            present = entries.len() + 1,
            "Name claimed"
        );
        entries.insert(name.to_string(), handle);

        Ok(())
    }

    /// Release a display name held by the given session
    ///
    /// Idempotent: releasing an absent name is a no-op. Returns whether an
    /// entry was removed.
    pub async fn release(&self, name: &str, session_id: u64) -> bool {
        let mut entries = self.entries.write().await;

        match entries.get(name).map(|entry| entry.session_id) {
            Some(owner) if owner == session_id => {
                // shift_remove keeps the remaining names in claim order
                entries.shift_remove(name);
                tracing::info!(
                    user = name,
                    session_id = session_id,
                    present = entries.len(),
                    "Name released"
                );
                true
            }
            Some(owner) => {
                tracing::warn!(
                    user = name,
                    expected = owner,
                    actual = session_id,
                    "Release owner mismatch"
                );
                false
            }
            None => false,
        }
    }

    /// Point-in-time copy of present names in claim order
    pub async fn snapshot(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Point-in-time copy of present connection handles in claim order
    pub async fn connections(&self) -> Vec<ConnectionHandle> {
        self.entries.read().await.values().cloned().collect()
    }

    /// Visit every present connection
    ///
    /// Iterates a copy, so `f` may close the visited connection or the
    /// registry may change underneath without disturbing the walk.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ConnectionHandle),
    {
        for handle in self.connections().await {
            f(&handle);
        }
    }

    /// Queue a frame for every present connection
    ///
    /// A recipient that is full or gone is logged and skipped; it never stops
    /// delivery to the rest.
    pub async fn broadcast(&self, frame: &OutboundFrame) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();

        self.for_each(|handle| match handle.send(frame.clone()) {
            Ok(()) => outcome.delivered += 1,
            Err(e) => {
                outcome.dropped += 1;
                match e {
                    DeliveryError::QueueFull => tracing::warn!(
                        session_id = handle.session_id,
                        peer = %handle.peer_addr,
                        error = %e,
                        "Dropping frame for slow recipient"
                    ),
                    DeliveryError::Closed => tracing::debug!(
                        session_id = handle.session_id,
                        error = %e,
                        "Skipping closed recipient"
                    ),
                }
            }
        })
        .await;

        outcome
    }

    /// Check whether a name is currently claimed
    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Number of present connections
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nobody is present
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
