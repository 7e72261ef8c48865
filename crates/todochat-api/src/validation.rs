//! Field-level request validation.
//!
//! Rules collect every violation into [`FieldErrors`] instead of stopping at
//! the first one, so a client sees all problems with a request at once.
//! Request bodies arrive as loose JSON, so presence and type checks live
//! here too.

use std::fmt;

use chrono::NaiveDate;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use todochat_types::api::{
    CreateConversationRequest, CreateTodoRequest, CreateUserRequest, SendMessageRequest,
};

/// Wrapper wording that rule failures carry and clients never see.
pub const VALUE_ERROR_PREFIX: &str = "Value error, ";

/// Input date format for todo due dates.
pub const DUE_DATE_FORMAT: &str = "%d.%m.%Y";

/// A single rule failure, rendered in the wording the rule layer reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Required,
    NotAString,
    TooShort { min: usize },
    TooLong { max: usize },
    /// Not a JSON integer at all.
    NotAnIntegerType,
    /// Text that does not parse as an integer.
    NotAnInteger,
    /// Failure of a custom rule.
    Value(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => f.write_str("Field required"),
            Self::NotAString => f.write_str("Input should be a valid string"),
            Self::TooShort { min } => write!(f, "String should have at least {} characters", min),
            Self::TooLong { max } => write!(f, "String should have at most {} characters", max),
            Self::NotAnIntegerType => f.write_str("Input should be a valid integer"),
            Self::NotAnInteger => {
                f.write_str("Input should be a valid integer, unable to parse string as an integer")
            }
            Self::Value(msg) => write!(f, "{}{}", VALUE_ERROR_PREFIX, msg),
        }
    }
}

/// Strip the generic wrapper prefix from a rule message.
pub fn normalize_message(msg: &str) -> &str {
    msg.strip_prefix(VALUE_ERROR_PREFIX).unwrap_or(msg)
}

/// Field name -> messages, in the order fields were first reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    fields: Vec<(String, Vec<String>)>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl fmt::Display) {
        let message = normalize_message(&message.to_string()).to_owned();
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, messages)) => messages.push(message),
            None => self.fields.push((field.to_owned(), vec![message])),
        }
    }

    pub fn single(field: &str, message: impl fmt::Display) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, messages)| messages.as_slice())
    }

    /// `Ok(value)` when nothing was reported.
    pub fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl Serialize for FieldErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, messages) in &self.fields {
            map.serialize_entry(field, messages)?;
        }
        map.end()
    }
}

fn required_str<'a>(errors: &mut FieldErrors, field: &str, value: &'a Option<Value>) -> Option<&'a str> {
    match value {
        None => {
            errors.add(field, Violation::Required);
            None
        }
        Some(value) => string_value(errors, field, value),
    }
}

fn optional_str<'a>(errors: &mut FieldErrors, field: &str, value: &'a Option<Value>) -> Option<&'a str> {
    value.as_ref().and_then(|value| string_value(errors, field, value))
}

fn string_value<'a>(errors: &mut FieldErrors, field: &str, value: &'a Value) -> Option<&'a str> {
    match value.as_str() {
        Some(text) => Some(text),
        None => {
            errors.add(field, Violation::NotAString);
            None
        }
    }
}

/// Integers may also arrive as numeric text.
fn required_int(errors: &mut FieldErrors, field: &str, value: &Option<Value>) -> Option<i64> {
    let violation = match value {
        None => Violation::Required,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(id) => return Some(id),
            None => Violation::NotAnIntegerType,
        },
        Some(Value::String(s)) => match s.trim().parse() {
            Ok(id) => return Some(id),
            Err(_) => Violation::NotAnInteger,
        },
        Some(_) => Violation::NotAnIntegerType,
    };
    errors.add(field, violation);
    None
}

fn check_length(errors: &mut FieldErrors, field: &str, value: &str, min: usize, max: usize) {
    let len = value.chars().count();
    if len < min {
        errors.add(field, Violation::TooShort { min });
    }
    if len > max {
        errors.add(field, Violation::TooLong { max });
    }
}

// -- Users --

pub fn validate_username(req: &CreateUserRequest) -> Result<String, FieldErrors> {
    let mut errors = FieldErrors::new();
    let username = required_str(&mut errors, "username", &req.username);
    if let Some(username) = username {
        check_length(&mut errors, "username", username, 3, 50);
    }
    match username {
        Some(username) if errors.is_empty() => Ok(username.to_owned()),
        _ => Err(errors),
    }
}

// -- Todos --

/// A todo request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
}

/// `today` is the reference date for the future-date rule.
pub fn validate_todo(req: &CreateTodoRequest, today: NaiveDate) -> Result<NewTodo, FieldErrors> {
    let mut errors = FieldErrors::new();

    let title = required_str(&mut errors, "title", &req.title);
    if let Some(title) = title {
        check_length(&mut errors, "title", title, 3, 20);
        if title.trim().is_empty() {
            errors.add("title", Violation::Value("Title must not be blank".into()));
        }
    }

    let description = optional_str(&mut errors, "description", &req.description);
    if let Some(description) = description {
        check_length(&mut errors, "description", description, 3, 100);
    }

    let due_date = required_str(&mut errors, "due_date", &req.due_date).and_then(|raw| {
        parse_due_date(raw, today)
            .map_err(|violation| errors.add("due_date", violation))
            .ok()
    });

    match (title, due_date) {
        (Some(title), Some(due_date)) if errors.is_empty() => Ok(NewTodo {
            title: title.to_owned(),
            description: description.map(str::to_owned),
            due_date,
        }),
        _ => Err(errors),
    }
}

fn parse_due_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, Violation> {
    let date = NaiveDate::parse_from_str(raw, DUE_DATE_FORMAT)
        .map_err(|_| Violation::Value("Date must be in DD.MM.YYYY format".into()))?;
    if date <= today {
        return Err(Violation::Value("Due date must be in the future".into()));
    }
    Ok(date)
}

// -- Conversations --

pub fn validate_conversation(req: &CreateConversationRequest) -> Result<(i64, i64), FieldErrors> {
    let mut errors = FieldErrors::new();
    let a = required_int(&mut errors, "user_a_id", &req.user_a_id);
    let b = required_int(&mut errors, "user_b_id", &req.user_b_id);

    match (a, b) {
        (Some(a), Some(b)) if a == b => {
            errors.add(
                "user_b_id",
                Violation::Value("Conversation must be between two different users".into()),
            );
            Err(errors)
        }
        (Some(a), Some(b)) => errors.finish((a, b)),
        _ => Err(errors),
    }
}

// -- Messages --

/// A message request that passed validation. `text` is trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub user_id: i64,
    pub text: String,
}

pub fn validate_message(req: &SendMessageRequest) -> Result<NewMessage, FieldErrors> {
    let mut errors = FieldErrors::new();
    let conversation_id = required_int(&mut errors, "conversation_id", &req.conversation_id);
    let user_id = required_int(&mut errors, "user_id", &req.user_id);

    let text = required_str(&mut errors, "text", &req.text).map(str::trim);
    if text == Some("") {
        errors.add("text", Violation::Value("Message text must not be empty".into()));
    }

    match (conversation_id, user_id, text) {
        (Some(conversation_id), Some(user_id), Some(text)) if errors.is_empty() => Ok(NewMessage {
            conversation_id,
            user_id,
            text: text.to_owned(),
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 15).unwrap()
    }

    fn todo(body: Value) -> CreateTodoRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn value_error_prefix_is_stripped() {
        assert_eq!(normalize_message("Value error, Bad date"), "Bad date");
        assert_eq!(normalize_message("Field required"), "Field required");

        let errors = FieldErrors::single("due_date", Violation::Value("Bad date".into()));
        assert_eq!(errors.get("due_date").unwrap(), ["Bad date"]);
    }

    #[test]
    fn valid_todo_passes() {
        let req = todo(json!({ "title": "Buy milk", "description": "two litres", "due_date": "16.06.2030" }));
        let new = validate_todo(&req, today()).unwrap();
        assert_eq!(new.due_date, NaiveDate::from_ymd_opt(2030, 6, 16).unwrap());
        assert_eq!(new.description.as_deref(), Some("two litres"));
    }

    #[test]
    fn two_rules_on_one_field_are_grouped() {
        let errors = validate_todo(&todo(json!({ "title": "  ", "due_date": "16.06.2030" })), today())
            .unwrap_err();
        assert_eq!(
            errors.get("title").unwrap(),
            ["String should have at least 3 characters", "Title must not be blank"]
        );
        assert!(errors.get("due_date").is_none());
    }

    #[test]
    fn every_bad_field_is_reported() {
        let req = todo(json!({ "title": "x".repeat(21), "description": "ab", "due_date": "2030-06-16" }));
        let errors = validate_todo(&req, today()).unwrap_err();
        assert_eq!(errors.get("title").unwrap(), ["String should have at most 20 characters"]);
        assert_eq!(
            errors.get("description").unwrap(),
            ["String should have at least 3 characters"]
        );
        assert_eq!(errors.get("due_date").unwrap(), ["Date must be in DD.MM.YYYY format"]);
    }

    #[test]
    fn missing_fields_are_reported_with_other_failures() {
        let errors = validate_todo(&todo(json!({})), today()).unwrap_err();
        assert_eq!(errors.get("title").unwrap(), ["Field required"]);
        assert_eq!(errors.get("due_date").unwrap(), ["Field required"]);

        let errors = validate_todo(&todo(json!({ "title": "ab" })), today()).unwrap_err();
        assert_eq!(errors.get("title").unwrap(), ["String should have at least 3 characters"]);
        assert_eq!(errors.get("due_date").unwrap(), ["Field required"]);
    }

    #[test]
    fn wrong_types_are_reported_per_field() {
        let req = todo(json!({ "title": 5, "description": null, "due_date": ["16.06.2030"] }));
        let errors = validate_todo(&req, today()).unwrap_err();
        assert_eq!(errors.get("title").unwrap(), ["Input should be a valid string"]);
        assert_eq!(errors.get("due_date").unwrap(), ["Input should be a valid string"]);
        assert!(errors.get("description").is_none());
    }

    #[test]
    fn due_date_must_be_after_today() {
        for date in ["15.06.2030", "01.01.2000"] {
            let errors = validate_todo(&todo(json!({ "title": "Buy milk", "due_date": date })), today())
                .unwrap_err();
            assert_eq!(errors.get("due_date").unwrap(), ["Due date must be in the future"]);
        }
    }

    #[test]
    fn username_length_is_bounded() {
        let user = |username: Value| CreateUserRequest { username: Some(username) };
        assert_eq!(validate_username(&user(json!("bob"))).unwrap(), "bob");
        assert!(validate_username(&user(json!("al"))).is_err());
        assert!(validate_username(&user(json!("a".repeat(51)))).is_err());

        let errors = validate_username(&CreateUserRequest::default()).unwrap_err();
        assert_eq!(errors.get("username").unwrap(), ["Field required"]);
    }

    #[test]
    fn same_user_twice_is_rejected() {
        let req = CreateConversationRequest { user_a_id: Some(json!(4)), user_b_id: Some(json!(4)) };
        let errors = validate_conversation(&req).unwrap_err();
        assert_eq!(
            errors.get("user_b_id").unwrap(),
            ["Conversation must be between two different users"]
        );
    }

    #[test]
    fn conversation_ids_accept_numbers_and_numeric_text() {
        let req = CreateConversationRequest { user_a_id: Some(json!(2)), user_b_id: Some(json!("1")) };
        assert_eq!(validate_conversation(&req).unwrap(), (2, 1));

        let req = CreateConversationRequest { user_a_id: Some(json!("x")), user_b_id: None };
        let errors = validate_conversation(&req).unwrap_err();
        assert_eq!(
            errors.get("user_a_id").unwrap(),
            ["Input should be a valid integer, unable to parse string as an integer"]
        );
        assert_eq!(errors.get("user_b_id").unwrap(), ["Field required"]);
    }

    #[test]
    fn message_text_is_trimmed() {
        let req: SendMessageRequest =
            serde_json::from_value(json!({ "conversation_id": 1, "user_id": 1, "text": "  hi  " })).unwrap();
        assert_eq!(validate_message(&req).unwrap().text, "hi");

        let blank: SendMessageRequest =
            serde_json::from_value(json!({ "conversation_id": 1, "text": " \n " })).unwrap();
        let errors = validate_message(&blank).unwrap_err();
        assert_eq!(errors.get("user_id").unwrap(), ["Field required"]);
        assert_eq!(errors.get("text").unwrap(), ["Message text must not be empty"]);
    }

    #[test]
    fn serializes_in_report_order() {
        let mut errors = FieldErrors::new();
        errors.add("title", "first");
        errors.add("due_date", "second");
        errors.add("title", "third");
        assert_eq!(
            serde_json::to_string(&errors).unwrap(),
            r#"{"title":["first","third"],"due_date":["second"]}"#
        );
    }
}
