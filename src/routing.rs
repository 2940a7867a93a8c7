//! Routing engine for private messages.
//!
//! Resolves a destination username to its connection set, validates the
//! payload, fans the message out to every target connection, and echoes it
//! back to the originating connection so the sender's UI reflects the send
//! without relying on self-membership in the fan-out.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::state::AppState;
use crate::ws::broadcast::{send_to_connection, send_to_user};
use crate::ws::protocol::{ServerEvent, WireError};
use crate::ws::ConnectionSender;

/// A routed message. Immutable once constructed; delivered, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivateMessage {
    pub from: String,
    pub to: String,
    pub content: String,
    /// Wall-clock milliseconds since the Unix epoch at send time.
    pub ts: i64,
}

/// Coerce an untyped payload field to a string the way the protocol
/// defines it: null/absent is empty, scalars use their display form, and
/// composite values normalize to empty (and thus fail validation).
fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// Route a private message from a bound connection.
///
/// Validation order: empty target or content -> `InvalidPayload`; target
/// not online -> `UserOffline` (the message is dropped, not queued). On
/// success the message goes to every connection of the target plus one
/// echo to the sender.
///
/// The offline check and the fan-out are not linearizable: a target that
/// disconnects in between simply receives nothing. Accepted race.
pub fn route_private_message(
    state: &AppState,
    from: &str,
    sender: &ConnectionSender,
    to: &Value,
    content: &Value,
) -> Result<PrivateMessage, WireError> {
    let target = coerce_to_string(to).trim().to_string();
    let body = coerce_to_string(content).trim().to_string();

    if target.is_empty() || body.is_empty() {
        return Err(WireError::InvalidPayload);
    }
    if !state.registry.is_online(&target) {
        return Err(WireError::UserOffline);
    }

    let message = PrivateMessage {
        from: from.to_string(),
        to: target,
        content: body,
        ts: Utc::now().timestamp_millis(),
    };

    let event = ServerEvent::PrivateMessage(message.clone());
    send_to_user(&state.registry, &message.to, &event);
    send_to_connection(sender, &event);

    tracing::debug!(
        from = %message.from,
        to = %message.to,
        "private:message routed"
    );

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionHandle;
    use crate::session::RecoveryTracker;
    use serde_json::json;
    use tokio::sync::mpsc;

    type Inbox = mpsc::UnboundedReceiver<axum::extract::ws::Message>;

    fn test_state() -> AppState {
        AppState {
            registry: crate::registry::PresenceRegistry::new(),
            recovery: RecoveryTracker::new(0),
        }
    }

    fn connect(state: &AppState, username: &str, socket_id: &str) -> (ConnectionSender, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        state.registry.add(
            username,
            ConnectionHandle {
                socket_id: socket_id.to_string(),
                sender: tx.clone(),
            },
        );
        (tx, rx)
    }

    fn drain(rx: &mut Inbox) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let axum::extract::ws::Message::Text(text) = msg {
                frames.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        frames
    }

    #[test]
    fn coercion_matches_protocol_rules() {
        assert_eq!(coerce_to_string(&Value::Null), "");
        assert_eq!(coerce_to_string(&json!("bob")), "bob");
        assert_eq!(coerce_to_string(&json!(42)), "42");
        assert_eq!(coerce_to_string(&json!(true)), "true");
        assert_eq!(coerce_to_string(&json!(["a"])), "");
        assert_eq!(coerce_to_string(&json!({"k":"v"})), "");
    }

    #[test]
    fn empty_target_or_content_is_invalid_payload() {
        let state = test_state();
        let (alice, _alice_rx) = connect(&state, "alice", "s1");
        let (_bob, mut bob_rx) = connect(&state, "bob", "s2");

        for (to, content) in [
            (json!(""), json!("hi")),
            (json!("   "), json!("hi")),
            (json!("bob"), json!("")),
            (json!("bob"), json!("  ")),
            (Value::Null, json!("hi")),
            (json!("bob"), Value::Null),
            (json!({"user": "bob"}), json!("hi")),
        ] {
            let result = route_private_message(&state, "alice", &alice, &to, &content);
            assert_eq!(result, Err(WireError::InvalidPayload), "to={to} content={content}");
        }
        assert!(drain(&mut bob_rx).is_empty(), "rejected payloads must not be delivered");
    }

    #[test]
    fn offline_target_is_rejected_and_dropped() {
        let state = test_state();
        let (alice, mut alice_rx) = connect(&state, "alice", "s1");

        let result =
            route_private_message(&state, "alice", &alice, &json!("bob"), &json!("hi"));
        assert_eq!(result, Err(WireError::UserOffline));
        assert!(drain(&mut alice_rx).is_empty(), "no echo for a dropped message");
    }

    #[test]
    fn routed_message_is_trimmed_and_stamped() {
        let state = test_state();
        let (alice, _alice_rx) = connect(&state, "alice", "s1");
        connect(&state, "bob", "s2");

        let message =
            route_private_message(&state, "alice", &alice, &json!("  bob "), &json!(" hi "))
                .unwrap();
        assert_eq!(message.from, "alice");
        assert_eq!(message.to, "bob");
        assert_eq!(message.content, "hi");
        assert!(message.ts > 0);
    }

    #[test]
    fn delivery_fans_out_to_target_connections_plus_one_echo() {
        let state = test_state();
        let (alice, mut alice_rx) = connect(&state, "alice", "s1");
        let (_bob1, mut bob1_rx) = connect(&state, "bob", "s2");
        let (_bob2, mut bob2_rx) = connect(&state, "bob", "s3");

        let message =
            route_private_message(&state, "alice", &alice, &json!("bob"), &json!("hi")).unwrap();

        for rx in [&mut bob1_rx, &mut bob2_rx, &mut alice_rx] {
            let frames = drain(rx);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0]["type"], "private:message");
            assert_eq!(frames[0]["from"], "alice");
            assert_eq!(frames[0]["to"], "bob");
            assert_eq!(frames[0]["content"], "hi");
            assert_eq!(frames[0]["ts"], message.ts);
        }
    }

    #[test]
    fn numeric_content_is_coerced_to_text() {
        let state = test_state();
        let (alice, _alice_rx) = connect(&state, "alice", "s1");
        connect(&state, "bob", "s2");

        let message =
            route_private_message(&state, "alice", &alice, &json!("bob"), &json!(42)).unwrap();
        assert_eq!(message.content, "42");
    }
}
