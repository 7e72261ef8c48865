use axum::{
    Json,
    extract::{Path, State},
};
use tracing::{debug, info, warn};

use todochat_types::api::{CreateTodoRequest, TodoResponse};
use todochat_types::events::GatewayEvent;

use crate::cache::todo_key;
use crate::error::ApiError;
use crate::extract::ValidJson;
use crate::rows::todo_response;
use crate::state::{AppState, with_db};
use crate::validation::{FieldErrors, Violation, validate_todo};

/// GET /todos, newest first.
pub async fn list_todos(State(state): State<AppState>) -> Result<Json<Vec<TodoResponse>>, ApiError> {
    let rows = with_db(&state, |db| db.list_todos()).await?;
    Ok(Json(rows.into_iter().map(todo_response).collect()))
}

/// POST /todos. Subscribers are notified of the new todo.
pub async fn create_todo(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CreateTodoRequest>,
) -> Result<Json<TodoResponse>, ApiError> {
    let todo = validate_todo(&req, chrono::Utc::now().date_naive())?;

    let row = with_db(&state, move |db| {
        db.insert_todo(
            &todo.title,
            todo.description.as_deref(),
            &todo.due_date.format("%Y-%m-%d").to_string(),
        )
    })
    .await?;

    let todo = todo_response(row);
    info!("Todo {} created, due {}", todo.id, todo.due_date);

    state.registry.notify(&GatewayEvent::TodoCreated(todo.clone())).await;
    Ok(Json(todo))
}

/// GET /todos/{todo_id}, served through the detail cache.
pub async fn get_todo(
    State(state): State<AppState>,
    Path(todo_id): Path<String>,
) -> Result<Json<TodoResponse>, ApiError> {
    let id: i64 = todo_id
        .parse()
        .map_err(|_| FieldErrors::single("todo_id", Violation::NotAnInteger))?;
    Ok(Json(get_todo_detail(&state, id).await?))
}

/// Cache-aside lookup of one todo.
///
/// A hit returns the cached record without touching the store or waiting.
/// A miss reads the store, waits `detail_delay`, then caches the record for
/// the cache TTL. Missing todos are never cached.
pub async fn get_todo_detail(state: &AppState, id: i64) -> Result<TodoResponse, ApiError> {
    let key = todo_key(id);

    if let Some(cached) = state.cache.get(&key).await {
        match serde_json::from_str::<TodoResponse>(&cached) {
            Ok(todo) => {
                debug!("Cache hit for {}", key);
                return Ok(todo);
            }
            Err(e) => warn!("Ignoring unreadable cache entry {}: {}", key, e),
        }
    }

    let row = with_db(state, move |db| db.get_todo(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Todo not found"))?;

    tokio::time::sleep(state.detail_delay).await;

    let todo = todo_response(row);
    match serde_json::to_string(&todo) {
        Ok(json) => state.cache.put(&key, &json).await,
        Err(e) => warn!("Failed to serialize todo {} for caching: {}", id, e),
    }

    Ok(todo)
}
