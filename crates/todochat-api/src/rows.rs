//! Row -> response conversion.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::warn;

use todochat_db::models::{ConversationRow, MessageRow, TodoRow, UserRow};
use todochat_types::api::{ConversationResponse, MessageResponse, TodoResponse, UserResponse};

pub fn user_response(row: UserRow) -> UserResponse {
    UserResponse {
        created_at: parse_timestamp(&row.created_at, "user", row.id),
        id: row.id,
        username: row.username,
    }
}

pub fn todo_response(row: TodoRow) -> TodoResponse {
    let due_date = NaiveDate::parse_from_str(&row.due_date, "%Y-%m-%d").unwrap_or_else(|e| {
        warn!("Corrupt due_date '{}' on todo {}: {}", row.due_date, row.id, e);
        NaiveDate::default()
    });

    TodoResponse {
        created_at: parse_timestamp(&row.created_at, "todo", row.id),
        id: row.id,
        title: row.title,
        description: row.description,
        due_date,
    }
}

pub fn conversation_response(row: ConversationRow) -> ConversationResponse {
    ConversationResponse {
        created_at: parse_timestamp(&row.created_at, "conversation", row.id),
        id: row.id,
        user_a_id: row.user_a_id,
        user_b_id: row.user_b_id,
    }
}

pub fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        created_at: parse_timestamp(&row.created_at, "message", row.id),
        id: row.id,
        conversation_id: row.conversation_id,
        user_id: row.user_id,
        text: row.text,
    }
}

fn parse_timestamp(raw: &str, entity: &str, id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') format, "YYYY-MM-DD HH:MM:SS", naive UTC
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on {} {}: {}", raw, entity, id, e);
            DateTime::default()
        })
}
