use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Request bodies keep every field as loose JSON. Presence and type are
// checked by the API's validation rules, so a body with several problems
// reports all of them at once. Unknown keys are ignored.

// -- Users --

#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    pub username: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

// -- Todos --

/// `due_date` arrives as `DD.MM.YYYY` text and is parsed during validation.
#[derive(Debug, Default, Deserialize)]
pub struct CreateTodoRequest {
    pub title: Option<Value>,
    pub description: Option<Value>,
    pub due_date: Option<Value>,
}

/// Canonical todo representation. The detail cache stores exactly this
/// serialized form, so a hit and a fresh lookup look the same to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

// -- Conversations --

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    pub user_a_id: Option<Value>,
    pub user_b_id: Option<Value>,
}

/// Always carries `user_a_id < user_b_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub id: i64,
    pub user_a_id: i64,
    pub user_b_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: ConversationResponse,
    /// Newest first.
    pub messages: Vec<MessageResponse>,
}

// -- Messages --

#[derive(Debug, Default, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: Option<Value>,
    pub user_id: Option<Value>,
    pub text: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: i64,
    pub conversation_id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
