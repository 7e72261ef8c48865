use axum::{Json, extract::State};
use tracing::info;

use todochat_types::api::{CreateUserRequest, UserResponse};

use crate::error::ApiError;
use crate::extract::ValidJson;
use crate::rows::user_response;
use crate::state::{AppState, with_db};
use crate::validation::validate_username;

/// GET /users, oldest first.
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let rows = with_db(&state, |db| db.list_users()).await?;
    Ok(Json(rows.into_iter().map(user_response).collect()))
}

pub async fn create_user(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CreateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let username = validate_username(&req)?;

    let created = with_db(&state, move |db| db.create_user(&username)).await?;
    let row = created.ok_or_else(|| ApiError::BadRequest("Username already exists".into()))?;

    info!("User {} registered as {}", row.id, row.username);
    Ok(Json(user_response(row)))
}
