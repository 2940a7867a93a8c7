use axum::{extract::State, Json, Router};

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// GET /api/users — the same roster snapshot the `users:list` broadcast
/// carries, for clients that want it over plain HTTP.
async fn list_users(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.snapshot())
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    // WebSocket endpoint (username claim via query param)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // REST surface
    let api_routes = Router::new().route("/api/users", axum::routing::get(list_users));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(ws_routes)
        .merge(api_routes)
        .merge(health)
        .with_state(state)
}
