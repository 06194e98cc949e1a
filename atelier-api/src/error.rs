use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use atelier_core::{CoreError, StoreError};

#[derive(Debug)]
pub enum AppError {
    Validation(String),
    Forbidden(String),
    NotFound(String),
    Conflict { code: &'static str, message: String },
    Unavailable(String),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => AppError::NotFound(msg),
            CoreError::ValidationError(msg) => AppError::Validation(msg),
            CoreError::Forbidden(msg) => AppError::Forbidden(msg),
            CoreError::InvalidState(msg) => AppError::Conflict { code: "invalid_state", message: msg },
            err @ CoreError::CapacityExceeded { .. } => AppError::Conflict {
                code: "capacity_exceeded",
                message: err.to_string(),
            },
            CoreError::Store(store) => store.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::Conflict { code: "conflict", message: msg },
            StoreError::Backend(e) => AppError::Unavailable(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation", msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            AppError::Unavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", "Storage temporarily unavailable".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, AppError>;
