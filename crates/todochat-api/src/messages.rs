use axum::{Json, extract::State, http::StatusCode};
use tracing::info;

use todochat_types::api::{MessageResponse, SendMessageRequest};
use todochat_types::events::GatewayEvent;

use crate::error::ApiError;
use crate::extract::ValidJson;
use crate::rows::message_response;
use crate::state::{AppState, with_db};
use crate::validation::{NewMessage, validate_message};

/// POST /messages. Only the conversation's two participants may post; the
/// stored message is pushed to every subscriber.
pub async fn send_message(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let NewMessage {
        conversation_id,
        user_id,
        text,
    } = validate_message(&req)?;

    let row = with_db(&state, move |db| -> Result<_, ApiError> {
        let conversation = db
            .get_conversation(conversation_id)?
            .ok_or_else(|| ApiError::not_found("Conversation not found"))?;
        if db.get_user_by_id(user_id)?.is_none() {
            return Err(ApiError::not_found("User not found"));
        }
        if !conversation.has_participant(user_id) {
            return Err(ApiError::Forbidden(
                "User is not a participant in this conversation".into(),
            ));
        }
        Ok(db.insert_message(conversation_id, user_id, &text)?)
    })
    .await?;

    let message = message_response(row);
    info!(
        "Message {} posted to conversation {} by user {}",
        message.id, message.conversation_id, message.user_id
    );

    state
        .registry
        .notify(&GatewayEvent::MessageCreated(message.clone()))
        .await;
    Ok((StatusCode::CREATED, Json(message)))
}
