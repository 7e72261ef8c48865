use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request, rejection::JsonRejection},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::validation::{FieldErrors, Violation};

/// `Json<T>` whose rejections come back as field errors instead of axum's
/// plain-text responses.
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::Validation(rejection_errors(&rejection))),
        }
    }
}

/// `Query<T>` with the same error shape as [`ValidJson`].
pub struct ValidQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::Validation(FieldErrors::single(
                "query",
                rejection.body_text(),
            ))),
        }
    }
}

fn rejection_errors(rejection: &JsonRejection) -> FieldErrors {
    match rejection {
        JsonRejection::JsonDataError(_) => data_error_fields(&rejection.body_text()),
        JsonRejection::JsonSyntaxError(_) => {
            FieldErrors::single("body", Violation::Value("JSON decode error".into()))
        }
        JsonRejection::MissingJsonContentType(_) => FieldErrors::single(
            "body",
            Violation::Value("Expected request with `Content-Type: application/json`".into()),
        ),
        other => FieldErrors::single("body", other.body_text()),
    }
}

/// Map a serde data error onto the field it concerns. The detail may carry
/// a `path: ` prefix for nested values; the last path segment names the
/// field. Anything unrecognised lands under `body`.
fn data_error_fields(text: &str) -> FieldErrors {
    let detail = text.split_once("target type: ").map_or(text, |(_, rest)| rest);
    let detail = detail.rfind(" at line ").map_or(detail, |at| &detail[..at]);

    let (path, message) = match detail.split_once(": ") {
        Some((path, message)) if !path.is_empty() && !path.contains(' ') => (Some(path), message),
        _ => (None, detail),
    };

    if let Some(field) = backticked(message, "missing field `") {
        return FieldErrors::single(field, Violation::Required);
    }
    match path {
        Some(path) => FieldErrors::single(path.rsplit('.').next().unwrap_or(path), message),
        None => FieldErrors::single("body", message),
    }
}

fn backticked<'a>(detail: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = detail.strip_prefix(prefix)?;
    rest.split_once('`').map(|(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Outer {
        inner: Inner,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Inner {
        name: String,
    }

    async fn reject(body: &str) -> FieldErrors {
        let req = Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap();
        match ValidJson::<Outer>::from_request(req, &()).await {
            Err(ApiError::Validation(errors)) => errors,
            Err(other) => panic!("unexpected rejection {:?}", other),
            Ok(_) => panic!("body {} was accepted", body),
        }
    }

    #[tokio::test]
    async fn missing_top_level_field_is_required() {
        let errors = reject("{}").await;
        assert_eq!(errors.get("inner").unwrap(), ["Field required"]);
    }

    #[tokio::test]
    async fn missing_nested_field_is_required() {
        let errors = reject(r#"{"inner":{}}"#).await;
        assert_eq!(errors.get("name").unwrap(), ["Field required"]);
    }

    #[tokio::test]
    async fn wrong_nested_type_is_reported_under_its_field() {
        let errors = reject(r#"{"inner":{"name":5}}"#).await;
        let messages = errors.get("name").unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("invalid type: integer `5`"), "{:?}", messages);
    }

    #[tokio::test]
    async fn syntax_error_goes_to_body() {
        let errors = reject("{not json").await;
        assert_eq!(errors.get("body").unwrap(), ["JSON decode error"]);
    }

    #[test]
    fn unrecognised_detail_goes_to_body() {
        let errors = data_error_fields(
            "Failed to deserialize the JSON body into the target type: invalid type: null, expected struct X",
        );
        assert_eq!(errors.get("body").unwrap(), ["invalid type: null, expected struct X"]);
    }
}
