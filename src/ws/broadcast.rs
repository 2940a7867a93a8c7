//! Fan-out helpers: serialize a server event once, then push it to one
//! connection, one user's connections, or everyone.

use axum::extract::ws::Message;

use crate::registry::PresenceRegistry;
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionSender;

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            None
        }
    }
}

/// Send an event to a single connection. Fire-and-forget: a closed channel
/// means the connection is already going away.
pub fn send_to_connection(tx: &ConnectionSender, event: &ServerEvent) {
    if let Some(msg) = encode(event) {
        let _ = tx.send(msg);
    }
}

/// Send an event to every connection registered under a username.
pub fn send_to_user(registry: &PresenceRegistry, username: &str, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };
    for sender in registry.connections_of(username) {
        let _ = sender.send(msg.clone());
    }
}

/// Broadcast an event to every connection of every user.
pub fn broadcast_to_all(registry: &PresenceRegistry, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };
    for sender in registry.all_senders() {
        let _ = sender.send(msg.clone());
    }
}
