//! Presence registry: the live directory of who is connected.
//!
//! Maps each username to its set of active connection handles. A user can
//! have multiple concurrent connections (multiple devices/tabs). Fan-out
//! delivery targets are exactly this registry's contents, so there is no
//! separate room bookkeeping to drift out of sync.

use dashmap::DashMap;
use std::sync::Arc;

use crate::ws::ConnectionSender;

/// One live connection registered under a username.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Transport-level connection id (UUID v4, or a recovered prior id).
    pub socket_id: String,
    /// Channel into the connection's writer task.
    pub sender: ConnectionSender,
}

/// Concurrent username -> connections multimap.
///
/// Invariants: a username key exists iff its connection set is non-empty,
/// and a socket_id appears under at most one username.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<DashMap<String, Vec<ConnectionHandle>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under a username, creating the entry if absent.
    /// Idempotent: re-adding the same socket_id is a no-op.
    pub fn add(&self, username: &str, handle: ConnectionHandle) {
        let mut connections = self.inner.entry(username.to_string()).or_default();
        if !connections.iter().any(|c| c.socket_id == handle.socket_id) {
            connections.push(handle);
        }

        tracing::debug!(
            username = %username,
            connections = connections.len(),
            "Connection registered"
        );
    }

    /// Remove a connection from a username's set; prunes the entry when the
    /// set becomes empty. No-op if the username or socket_id is absent.
    pub fn remove(&self, username: &str, socket_id: &str) {
        if let Some(mut connections) = self.inner.get_mut(username) {
            connections.retain(|c| c.socket_id != socket_id);
        }
        self.inner.remove_if(username, |_, connections| connections.is_empty());

        tracing::debug!(
            username = %username,
            socket_id = %socket_id,
            "Connection unregistered"
        );
    }

    /// True iff the username has at least one registered connection.
    pub fn is_online(&self, username: &str) -> bool {
        self.inner
            .get(username)
            .map(|connections| !connections.is_empty())
            .unwrap_or(false)
    }

    /// All currently online usernames, sorted ascending. Recomputed on
    /// demand; duplicates are impossible by construction.
    pub fn snapshot(&self) -> Vec<String> {
        let mut users: Vec<String> = self.inner.iter().map(|entry| entry.key().clone()).collect();
        users.sort();
        users
    }

    /// Senders for every connection registered under a username.
    /// Cloned out so callers never send while holding a shard lock.
    pub fn connections_of(&self, username: &str) -> Vec<ConnectionSender> {
        self.inner
            .get(username)
            .map(|connections| connections.iter().map(|c| c.sender.clone()).collect())
            .unwrap_or_default()
    }

    /// Senders for every connection of every user.
    pub fn all_senders(&self) -> Vec<ConnectionSender> {
        self.inner
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .map(|c| c.sender.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
