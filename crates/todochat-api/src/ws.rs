use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};
use tracing::warn;

use todochat_gateway::connection;

use crate::state::AppState;

/// GET /ws: subscribe to todo and message broadcasts.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let registry = state.registry.clone();
    ws.on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| connection::handle_connection(socket, registry))
}
