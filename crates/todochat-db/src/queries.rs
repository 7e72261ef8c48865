use crate::models::{ConversationRow, MessageRow, TodoRow, UserRow};
use crate::{Database, now_timestamp};
use anyhow::Result;
use rusqlite::{Connection, Row};
use tracing::{debug, info};

/// Outcome of resolving a user pair to its conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A new conversation row was inserted.
    Created(ConversationRow),
    /// The pair already had a conversation (possibly created by a concurrent request).
    Existing(ConversationRow),
    /// At least one of the two users does not exist.
    MissingUser,
}

/// Sorts a user pair into stored order: smaller id first.
pub fn canonical_pair(a: i64, b: i64) -> (i64, i64) {
    if a <= b { (a, b) } else { (b, a) }
}

const USER_COLUMNS: &str = "id, username, created_at";
const TODO_COLUMNS: &str = "id, title, description, due_date, created_at";
const CONVERSATION_COLUMNS: &str = "id, user_a_id, user_b_id, created_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, user_id, text, created_at";

impl Database {
    // -- Users --

    /// Inserts a user. Returns `None` if the username is already taken,
    /// whether that is seen up front or only via the unique constraint.
    pub fn create_user(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            if query_user_by_username(conn, username)?.is_some() {
                return Ok(None);
            }

            let inserted = conn.query_row(
                &format!(
                    "INSERT INTO users (username, created_at) VALUES (?1, ?2) RETURNING {USER_COLUMNS}"
                ),
                (username, now_timestamp()),
                user_from_row,
            );

            match inserted {
                Ok(row) => Ok(Some(row)),
                Err(e) if is_unique_violation(&e) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Todos --

    pub fn insert_todo(
        &self,
        title: &str,
        description: Option<&str>,
        due_date: &str,
    ) -> Result<TodoRow> {
        self.with_conn_mut(|conn| {
            let row = conn.query_row(
                &format!(
                    "INSERT INTO todos (title, description, due_date, created_at)
                     VALUES (?1, ?2, ?3, ?4) RETURNING {TODO_COLUMNS}"
                ),
                rusqlite::params![title, description, due_date, now_timestamp()],
                todo_from_row,
            )?;
            Ok(row)
        })
    }

    /// Newest first.
    pub fn list_todos(&self) -> Result<Vec<TodoRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TODO_COLUMNS} FROM todos ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([], todo_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_todo(&self, id: i64) -> Result<Option<TodoRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"),
                    [id],
                    todo_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Conversations --

    /// Finds the conversation for a pair, creating it if needed.
    ///
    /// The pair is sorted first, so `(a, b)` and `(b, a)` resolve to the same
    /// row. Callers must reject `a == b` beforehand.
    pub fn resolve_conversation(&self, a: i64, b: i64) -> Result<Resolution> {
        let (user_a_id, user_b_id) = canonical_pair(a, b);

        self.with_conn_mut(|conn| {
            if let Some(existing) = query_conversation_by_pair(conn, user_a_id, user_b_id)? {
                return Ok(Resolution::Existing(existing));
            }

            if query_user_by_id(conn, user_a_id)?.is_none()
                || query_user_by_id(conn, user_b_id)?.is_none()
            {
                return Ok(Resolution::MissingUser);
            }

            insert_conversation_or_fetch(conn, user_a_id, user_b_id)
        })
    }

    pub fn find_conversation_by_pair(&self, a: i64, b: i64) -> Result<Option<ConversationRow>> {
        let (user_a_id, user_b_id) = canonical_pair(a, b);
        self.with_conn(|conn| query_conversation_by_pair(conn, user_a_id, user_b_id))
    }

    pub fn get_conversation(&self, id: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                    [id],
                    conversation_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_conversations(&self) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations ORDER BY id ASC"
            ))?;
            let rows = stmt
                .query_map([], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, conversation_id: i64, user_id: i64, text: &str) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let row = conn.query_row(
                &format!(
                    "INSERT INTO messages (conversation_id, user_id, text, created_at)
                     VALUES (?1, ?2, ?3, ?4) RETURNING {MESSAGE_COLUMNS}"
                ),
                rusqlite::params![conversation_id, user_id, text, now_timestamp()],
                message_from_row,
            )?;
            Ok(row)
        })
    }

    /// Messages of one conversation, newest first.
    pub fn list_messages(&self, conversation_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([conversation_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Inserts an already-sorted pair. Losing a creation race to another writer
/// shows up as a unique violation, in which case the winner's row is returned.
fn insert_conversation_or_fetch(
    conn: &Connection,
    user_a_id: i64,
    user_b_id: i64,
) -> Result<Resolution> {
    let inserted = conn.query_row(
        &format!(
            "INSERT INTO conversations (user_a_id, user_b_id, created_at)
             VALUES (?1, ?2, ?3) RETURNING {CONVERSATION_COLUMNS}"
        ),
        rusqlite::params![user_a_id, user_b_id, now_timestamp()],
        conversation_from_row,
    );

    match inserted {
        Ok(row) => {
            info!("Conversation {} created for users {} and {}", row.id, user_a_id, user_b_id);
            Ok(Resolution::Created(row))
        }
        Err(e) if is_unique_violation(&e) => {
            debug!("Conversation ({}, {}) created concurrently, re-fetching", user_a_id, user_b_id);
            let existing = query_conversation_by_pair(conn, user_a_id, user_b_id)?
                .ok_or_else(|| anyhow::anyhow!("conversation ({user_a_id}, {user_b_id}) vanished after unique violation"))?;
            Ok(Resolution::Existing(existing))
        }
        Err(e) => Err(e.into()),
    }
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            [username],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_conversation_by_pair(
    conn: &Connection,
    user_a_id: i64,
    user_b_id: i64,
) -> Result<Option<ConversationRow>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE user_a_id = ?1 AND user_b_id = ?2"
            ),
            [user_a_id, user_b_id],
            conversation_from_row,
        )
        .optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<TodoRow> {
    Ok(TodoRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        due_date: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_a_id: row.get(1)?,
        user_b_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        user_id: row.get(2)?,
        text: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
