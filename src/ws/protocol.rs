//! JSON wire protocol: event types, error codes, and inbound dispatch.
//!
//! All frames are JSON text messages tagged by a `type` field. Requests that
//! carry a `request_id` are answered with an `ack` frame; requests without
//! one are processed but never acknowledged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::routing::{self, PrivateMessage};
use crate::session::Session;
use crate::state::AppState;
use crate::ws::broadcast::send_to_connection;
use crate::ws::ConnectionSender;

/// Close code sent when a connection attempt lacks a usable username.
pub const CLOSE_USERNAME_REQUIRED: u16 = 4001;

/// Errors surfaced to clients, either as a close reason (handshake) or as
/// the `error` field of an `ack` frame (message requests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    /// Handshake carried no username (or only whitespace). Connection refused.
    #[error("USERNAME_REQUIRED")]
    UsernameRequired,
    /// Message request with an empty target or empty content after trimming.
    #[error("INVALID_PAYLOAD")]
    InvalidPayload,
    /// Target username has no registered connections. Message dropped.
    #[error("USER_OFFLINE")]
    UserOffline,
}

impl WireError {
    /// Wire representation, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UsernameRequired => "USERNAME_REQUIRED",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::UserOffline => "USER_OFFLINE",
        }
    }
}

/// Client -> server events.
///
/// `to` and `content` are deliberately untyped: the routing engine owns
/// coercion and validation of whatever the client sent.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "private:message")]
    PrivateMessage {
        #[serde(default)]
        request_id: Option<String>,
        #[serde(default)]
        to: Value,
        #[serde(default)]
        content: Value,
    },
}

/// Server -> client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Sent to a newly admitted connection only.
    #[serde(rename = "me")]
    Me {
        username: String,
        socket_id: String,
        recovered: bool,
    },
    /// Roster snapshot, broadcast to every connection on connect/disconnect.
    #[serde(rename = "users:list")]
    UsersList { users: Vec<String> },
    /// Routed message, delivered to the target's connections and echoed to
    /// the sender.
    #[serde(rename = "private:message")]
    PrivateMessage(PrivateMessage),
    /// Result of a request that carried a `request_id`.
    #[serde(rename = "ack")]
    Ack {
        request_id: String,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<&'static str>,
    },
}

impl ServerEvent {
    pub fn ack_ok(request_id: String) -> Self {
        Self::Ack {
            request_id,
            ok: true,
            error: None,
        }
    }

    pub fn ack_err(request_id: String, err: WireError) -> Self {
        Self::Ack {
            request_id,
            ok: false,
            error: Some(err.code()),
        }
    }
}

/// Handle an incoming text frame from a bound connection.
/// Decodes the event, dispatches it, and acknowledges when requested.
pub fn handle_text_message(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    session: &Session,
) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(ClientEvent::PrivateMessage {
            request_id,
            to,
            content,
        }) => {
            let result =
                routing::route_private_message(state, &session.username, tx, &to, &content);

            if let Err(err) = &result {
                tracing::debug!(
                    username = %session.username,
                    error = %err,
                    "private:message rejected"
                );
            }

            if let Some(request_id) = request_id {
                let ack = match result {
                    Ok(_) => ServerEvent::ack_ok(request_id),
                    Err(err) => ServerEvent::ack_err(request_id, err),
                };
                send_to_connection(tx, &ack);
            }
        }
        Err(e) => {
            tracing::warn!(
                username = %session.username,
                error = %e,
                "Failed to decode client event"
            );
            // Ack the failure when the frame still carries a request_id;
            // anything less parseable than that is dropped.
            if let Some(request_id) = extract_request_id(text) {
                send_to_connection(tx, &ServerEvent::ack_err(request_id, WireError::InvalidPayload));
            }
        }
    }
}

fn extract_request_id(text: &str) -> Option<String> {
    serde_json::from_str::<Value>(text)
        .ok()?
        .get("request_id")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_message_event_decodes_with_untyped_fields() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"private:message","request_id":"r1","to":"bob","content":42}"#,
        )
        .unwrap();
        let ClientEvent::PrivateMessage {
            request_id,
            to,
            content,
        } = event;
        assert_eq!(request_id.as_deref(), Some("r1"));
        assert_eq!(to, Value::String("bob".into()));
        assert_eq!(content, Value::from(42));
    }

    #[test]
    fn missing_fields_default_to_null() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"private:message"}"#).unwrap();
        let ClientEvent::PrivateMessage {
            request_id,
            to,
            content,
        } = event;
        assert!(request_id.is_none());
        assert!(to.is_null());
        assert!(content.is_null());
    }

    #[test]
    fn unknown_event_type_fails_to_decode() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn server_events_serialize_with_type_tags() {
        let me = ServerEvent::Me {
            username: "alice".into(),
            socket_id: "s1".into(),
            recovered: false,
        };
        let json = serde_json::to_value(&me).unwrap();
        assert_eq!(json["type"], "me");
        assert_eq!(json["username"], "alice");
        assert_eq!(json["recovered"], false);

        let roster = ServerEvent::UsersList {
            users: vec!["alice".into(), "bob".into()],
        };
        let json = serde_json::to_value(&roster).unwrap();
        assert_eq!(json["type"], "users:list");
        assert_eq!(json["users"][1], "bob");
    }

    #[test]
    fn ack_omits_error_field_on_success() {
        let json = serde_json::to_value(ServerEvent::ack_ok("r1".into())).unwrap();
        assert_eq!(json["type"], "ack");
        assert_eq!(json["ok"], true);
        assert!(json.get("error").is_none());

        let json =
            serde_json::to_value(ServerEvent::ack_err("r2".into(), WireError::UserOffline))
                .unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "USER_OFFLINE");
    }

    #[test]
    fn request_id_is_extractable_from_malformed_events() {
        assert_eq!(
            extract_request_id(r#"{"type":"bogus","request_id":"r9"}"#),
            Some("r9".to_string())
        );
        assert_eq!(extract_request_id("not json"), None);
        assert_eq!(extract_request_id(r#"{"request_id":7}"#), None);
    }
}
