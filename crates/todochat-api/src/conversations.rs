use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::Deserialize;

use todochat_db::Resolution;
use todochat_types::api::{ConversationDetail, ConversationResponse, CreateConversationRequest};

use crate::error::ApiError;
use crate::extract::{ValidJson, ValidQuery};
use crate::rows::{conversation_response, message_response};
use crate::state::{AppState, with_db};
use crate::validation::{FieldErrors, Violation, validate_conversation};

/// POST /conversations. 201 when the pair is new, 200 when it already had one.
pub async fn create_conversation(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>), ApiError> {
    let (a, b) = validate_conversation(&req)?;

    match with_db(&state, move |db| db.resolve_conversation(a, b)).await? {
        Resolution::Created(row) => Ok((StatusCode::CREATED, Json(conversation_response(row)))),
        Resolution::Existing(row) => Ok((StatusCode::OK, Json(conversation_response(row)))),
        Resolution::MissingUser => Err(ApiError::not_found("One or both users not found")),
    }
}

pub async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConversationResponse>>, ApiError> {
    let rows = with_db(&state, |db| db.list_conversations()).await?;
    Ok(Json(rows.into_iter().map(conversation_response).collect()))
}

/// Either `user_a`/`user_b` (ids) or `username_a`/`username_b`.
#[derive(Debug, Default, Deserialize)]
pub struct ByUsersQuery {
    pub user_a: Option<String>,
    pub user_b: Option<String>,
    pub username_a: Option<String>,
    pub username_b: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PairLookup {
    Ids(i64, i64),
    Usernames(String, String),
}

pub fn parse_pair_query(query: ByUsersQuery) -> Result<PairLookup, FieldErrors> {
    let by_id = query.user_a.is_some() || query.user_b.is_some();
    let by_name = query.username_a.is_some() || query.username_b.is_some();
    let mut errors = FieldErrors::new();

    if by_id && by_name {
        errors.add(
            "query",
            Violation::Value("Provide either user_a/user_b or username_a/username_b, not both".into()),
        );
        return Err(errors);
    }

    if by_name {
        let a = required(&mut errors, "username_a", query.username_a);
        let b = required(&mut errors, "username_b", query.username_b);
        return match (a, b) {
            (Some(a), Some(b)) if a == b => {
                errors.add("username_b", Violation::Value("Usernames must be different".into()));
                Err(errors)
            }
            (Some(a), Some(b)) => Ok(PairLookup::Usernames(a, b)),
            _ => Err(errors),
        };
    }

    let a = required(&mut errors, "user_a", query.user_a).and_then(|v| integer(&mut errors, "user_a", &v));
    let b = required(&mut errors, "user_b", query.user_b).and_then(|v| integer(&mut errors, "user_b", &v));
    match (a, b) {
        (Some(a), Some(b)) if a == b => {
            errors.add("user_b", Violation::Value("User ids must be different".into()));
            Err(errors)
        }
        (Some(a), Some(b)) => Ok(PairLookup::Ids(a, b)),
        _ => Err(errors),
    }
}

fn required(errors: &mut FieldErrors, field: &str, value: Option<String>) -> Option<String> {
    if value.is_none() {
        errors.add(field, Violation::Required);
    }
    value
}

fn integer(errors: &mut FieldErrors, field: &str, value: &str) -> Option<i64> {
    match value.trim().parse() {
        Ok(id) => Some(id),
        Err(_) => {
            errors.add(field, Violation::NotAnInteger);
            None
        }
    }
}

/// GET /conversations/by_users. Messages come back newest first.
pub async fn get_conversation_by_users(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ByUsersQuery>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let lookup = parse_pair_query(query)?;

    let detail = with_db(&state, move |db| -> anyhow::Result<Option<ConversationDetail>> {
        let pair = match lookup {
            PairLookup::Ids(a, b) => Some((a, b)),
            PairLookup::Usernames(a, b) => {
                match (db.get_user_by_username(&a)?, db.get_user_by_username(&b)?) {
                    (Some(a), Some(b)) => Some((a.id, b.id)),
                    _ => None,
                }
            }
        };

        let conversation = match pair {
            Some((a, b)) => db.find_conversation_by_pair(a, b)?,
            None => None,
        };
        let Some(conversation) = conversation else {
            return Ok(None);
        };

        let messages = db.list_messages(conversation.id)?;
        Ok(Some(ConversationDetail {
            conversation: conversation_response(conversation),
            messages: messages.into_iter().map(message_response).collect(),
        }))
    })
    .await?;

    detail
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Conversation not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> ByUsersQuery {
        let mut q = ByUsersQuery::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "user_a" => q.user_a = value,
                "user_b" => q.user_b = value,
                "username_a" => q.username_a = value,
                "username_b" => q.username_b = value,
                _ => unreachable!(),
            }
        }
        q
    }

    #[test]
    fn ids_are_parsed() {
        assert_eq!(
            parse_pair_query(query(&[("user_a", "2"), ("user_b", "1")])).unwrap(),
            PairLookup::Ids(2, 1)
        );
    }

    #[test]
    fn usernames_are_accepted() {
        assert_eq!(
            parse_pair_query(query(&[("username_a", "alice"), ("username_b", "bob")])).unwrap(),
            PairLookup::Usernames("alice".into(), "bob".into())
        );
    }

    #[test]
    fn empty_query_reports_both_ids() {
        let errors = parse_pair_query(ByUsersQuery::default()).unwrap_err();
        assert_eq!(errors.get("user_a").unwrap(), ["Field required"]);
        assert_eq!(errors.get("user_b").unwrap(), ["Field required"]);
    }

    #[test]
    fn bad_and_equal_ids_are_rejected() {
        let errors = parse_pair_query(query(&[("user_a", "x"), ("user_b", "1")])).unwrap_err();
        assert!(errors.get("user_a").is_some());

        let errors = parse_pair_query(query(&[("user_a", "1"), ("user_b", "1")])).unwrap_err();
        assert_eq!(errors.get("user_b").unwrap(), ["User ids must be different"]);
    }

    #[test]
    fn mixing_styles_is_rejected() {
        let errors = parse_pair_query(query(&[("user_a", "1"), ("username_b", "bob")])).unwrap_err();
        assert!(errors.get("query").is_some());
    }
}
