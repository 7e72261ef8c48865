use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::state::AppState;
use crate::{conversations, messages, todos, users, ws};

/// All HTTP and websocket routes. Cross-cutting layers (CORS, tracing) are
/// added by the server binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/todos", get(todos::list_todos).post(todos::create_todo))
        .route("/todos/{todo_id}", get(todos::get_todo))
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route("/conversations/by_users", get(conversations::get_conversation_by_users))
        .route("/messages", post(messages::send_message))
        .route("/ws", get(ws::ws_upgrade))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "hello world" }))
}
