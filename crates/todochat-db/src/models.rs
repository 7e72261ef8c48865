//! Database row types. These map directly to SQLite rows; timestamps and
//! dates stay as the stored text and are parsed by the API layer.

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TodoRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// `YYYY-MM-DD`
    pub due_date: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub id: i64,
    pub user_a_id: i64,
    pub user_b_id: i64,
    pub created_at: String,
}

impl ConversationRow {
    pub fn has_participant(&self, user_id: i64) -> bool {
        self.user_a_id == user_id || self.user_b_id == user_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: String,
}
