use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use notalytics_core::error::CoreError;

/// Application-level errors that map directly to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },

    /// A newer pass started before this one could publish.
    #[error("pass {pass_id} superseded by pass {latest}")]
    Superseded { pass_id: u64, latest: u64 },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidParameter { field, value } => AppError::InvalidField {
                field,
                message: format!("unsupported value '{value}'"),
            },
            CoreError::InvalidFunnel(msg) => AppError::BadRequest(msg),
            other => AppError::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, field) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
                None,
            ),
            AppError::InvalidField { field, message } => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                message.clone(),
                Some(*field),
            ),
            AppError::Superseded { .. } => (
                StatusCode::CONFLICT,
                "superseded",
                self.to_string(),
                None,
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        (
            status,
            Json(json!({
                "error": {
                    "code": code,
                    "message": message,
                    "field": field
                }
            })),
        )
            .into_response()
    }
}
