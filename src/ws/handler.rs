use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::session::Session;
use crate::state::AppState;
use crate::ws::actor;
use crate::ws::protocol::CLOSE_USERNAME_REQUIRED;

/// Query parameters for a WebSocket connection attempt.
/// The username claim rides on the upgrade request; `session` optionally
/// presents a prior socket_id for reconnection recovery.
#[derive(Debug, Deserialize)]
pub struct WsConnectQuery {
    pub username: Option<String>,
    pub session: Option<String>,
}

/// GET /ws?username=NAME[&session=PRIOR_SOCKET_ID]
/// WebSocket upgrade endpoint. Identity binding runs before admission: a
/// missing or blank username upgrades and then immediately closes with
/// code 4001, so no handlers ever run for the refused attempt.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match Session::bind(
        params.username.as_deref(),
        params.session.as_deref(),
        &state.recovery,
    ) {
        Ok(session) => {
            tracing::info!(
                username = %session.username,
                socket_id = %session.socket_id,
                recovered = session.recovered,
                "WebSocket connection bound"
            );
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, session))
        }
        Err(err) => {
            tracing::warn!(
                close_code = CLOSE_USERNAME_REQUIRED,
                reason = err.code(),
                "WebSocket binding refused"
            );
            ws.on_upgrade(move |socket| refuse(socket, err.code()))
        }
    }
}

/// Close a refused connection with the binding error as the reason.
async fn refuse(mut socket: WebSocket, reason: &'static str) {
    let close_frame = CloseFrame {
        code: CLOSE_USERNAME_REQUIRED,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(close_frame))).await;
}
