use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::validation::FieldErrors;

/// Every handler failure funnels through this type on its way to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Rendered as `{"errors": {field: [message, ...]}}`.
    #[error("request validation failed")]
    Validation(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(detail: &str) -> Self {
        Self::NotFound(detail.to_owned())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

#[derive(Serialize)]
struct ValidationBody {
    errors: FieldErrors,
}

#[derive(Serialize)]
struct DetailBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Validation(errors) => (status, Json(ValidationBody { errors })).into_response(),
            Self::BadRequest(detail) | Self::NotFound(detail) | Self::Forbidden(detail) => {
                (status, Json(DetailBody { detail })).into_response()
            }
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                (
                    status,
                    Json(DetailBody {
                        detail: "Internal server error".into(),
                    }),
                )
                    .into_response()
            }
        }
    }
}
