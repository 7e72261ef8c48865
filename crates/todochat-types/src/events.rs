use serde::{Deserialize, Serialize};

use crate::api::{MessageResponse, TodoResponse};

/// Events pushed to every websocket subscriber.
///
/// Serialized untagged: subscribers receive the bare record, and message
/// events are told apart from todo events by their `conversation_id` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GatewayEvent {
    /// A todo was created
    TodoCreated(TodoResponse),

    /// A chat message was posted to a conversation
    MessageCreated(MessageResponse),
}

impl GatewayEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TodoCreated(_) => "todo_created",
            Self::MessageCreated(_) => "message_created",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
