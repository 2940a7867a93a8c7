//! Per-connection session lifecycle and reconnection recovery.
//!
//! Each connection moves through a small state machine:
//! Connecting -> Bound (username validated and attached) -> Active
//! (registered, announced) -> Disconnected. Binding happens before the
//! connection is admitted; activation and disconnect drive the presence
//! registry and the roster broadcasts.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::registry::ConnectionHandle;
use crate::state::AppState;
use crate::ws::broadcast::{broadcast_to_all, send_to_connection};
use crate::ws::protocol::{ServerEvent, WireError};
use crate::ws::ConnectionSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport upgrade in flight, identity not yet validated.
    Connecting,
    /// Identity attached; not yet registered or announced.
    Bound,
    /// Registered in the presence registry and visible on the roster.
    Active,
    /// Terminal. A recovered reconnection is a new session, not this one.
    Disconnected,
}

/// State attached to one connection for its whole lifetime.
#[derive(Debug)]
pub struct Session {
    pub username: String,
    pub socket_id: String,
    pub recovered: bool,
    phase: SessionPhase,
}

impl Session {
    /// Identity binding: validate the claimed username and attach it.
    /// Runs once per connection attempt, before admission. A missing or
    /// all-whitespace claim refuses the attempt with no side effects.
    ///
    /// A `session` token naming a recently disconnected socket_id of the
    /// same username resumes that id and marks the session recovered.
    pub fn bind(
        claim: Option<&str>,
        session_token: Option<&str>,
        recovery: &RecoveryTracker,
    ) -> Result<Self, WireError> {
        let username = claim.map(str::trim).unwrap_or_default();
        if username.is_empty() {
            return Err(WireError::UsernameRequired);
        }

        let (socket_id, recovered) = match session_token {
            Some(token) if recovery.claim(token, username) => (token.to_string(), true),
            _ => (Uuid::new_v4().to_string(), false),
        };

        Ok(Self {
            username: username.to_string(),
            socket_id,
            recovered,
            phase: SessionPhase::Bound,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Admit the bound session: register the connection, tell the new
    /// client who it is, and broadcast the updated roster to everyone
    /// (including the new connection).
    pub fn activate(&mut self, state: &AppState, tx: &ConnectionSender) {
        if self.phase != SessionPhase::Bound {
            tracing::warn!(
                username = %self.username,
                phase = ?self.phase,
                "activate called outside Bound phase"
            );
            return;
        }

        state.registry.add(
            &self.username,
            ConnectionHandle {
                socket_id: self.socket_id.clone(),
                sender: tx.clone(),
            },
        );
        self.phase = SessionPhase::Active;

        send_to_connection(
            tx,
            &ServerEvent::Me {
                username: self.username.clone(),
                socket_id: self.socket_id.clone(),
                recovered: self.recovered,
            },
        );
        broadcast_to_all(
            &state.registry,
            &ServerEvent::UsersList {
                users: state.registry.snapshot(),
            },
        );
    }

    /// Terminal transition: deregister, arm the recovery window for this
    /// socket_id, and rebroadcast the roster to the remaining connections.
    pub fn disconnect(&mut self, state: &AppState) {
        let was_active = self.phase == SessionPhase::Active;
        self.phase = SessionPhase::Disconnected;
        if !was_active {
            return;
        }

        state.registry.remove(&self.username, &self.socket_id);
        state.recovery.arm(&self.socket_id, &self.username);

        broadcast_to_all(
            &state.registry,
            &ServerEvent::UsersList {
                users: state.registry.snapshot(),
            },
        );
    }
}

#[derive(Debug, Clone)]
struct RecoveryEntry {
    username: String,
    expires_at: DateTime<Utc>,
}

/// Tracks socket_ids eligible for reconnection recovery.
///
/// On disconnect the departed socket_id is armed for `window_secs`; a
/// reconnect presenting it as a `session` token within the window (and
/// under the same username) continues that id. Entries are consumed on
/// claim and purged by a background sweep.
#[derive(Clone)]
pub struct RecoveryTracker {
    entries: Arc<DashMap<String, RecoveryEntry>>,
    window_secs: u64,
}

impl RecoveryTracker {
    pub fn new(window_secs: u64) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            window_secs,
        }
    }

    /// Make a departed socket_id recoverable until the window elapses.
    pub fn arm(&self, socket_id: &str, username: &str) {
        if self.window_secs == 0 {
            return;
        }
        self.arm_until(
            socket_id,
            username,
            Utc::now() + Duration::seconds(self.window_secs as i64),
        );
    }

    fn arm_until(&self, socket_id: &str, username: &str, expires_at: DateTime<Utc>) {
        self.entries.insert(
            socket_id.to_string(),
            RecoveryEntry {
                username: username.to_string(),
                expires_at,
            },
        );
    }

    /// Consume a recovery token. True iff it exists, has not expired, and
    /// belongs to the claiming username. A token armed for a different
    /// username is left in place.
    pub fn claim(&self, socket_id: &str, username: &str) -> bool {
        match self
            .entries
            .remove_if(socket_id, |_, entry| entry.username == username)
        {
            Some((_, entry)) => entry.expires_at > Utc::now(),
            None => false,
        }
    }

    /// Drop expired entries; returns how many were purged.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.expires_at > now;
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }
}

/// Spawn a background task that periodically purges expired recovery
/// entries. Claims already reject expired tokens; the sweep only bounds
/// memory for tokens nobody ever presents again.
pub fn spawn_recovery_sweep(recovery: RecoveryTracker, interval_secs: u64) {
    let interval = std::time::Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let purged = recovery.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Recovery window sweep");
            }
        }
    });
}
