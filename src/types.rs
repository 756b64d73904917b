// Application error type and HTTP mapping

use crate::db::StoreError;
use crate::schedule::{CatalogError, InvalidFrequency};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Scheduling error: {0}")]
    Schedule(#[from] CatalogError),

    #[error(transparent)]
    InvalidFrequency(#[from] InvalidFrequency),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Store(StoreError::Conflict(_)) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Schedule(CatalogError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Schedule(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidFrequency(_) | AppError::Validation(_) | AppError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        // Server-side details stay in the log
        let message = match &self {
            AppError::Store(StoreError::Conflict(field)) => format!("A user with this {field} already exists."),
            AppError::Store(_) | AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Schedule(CatalogError::Unavailable(_)) => {
                "Task deletion schedule could not be updated, try again later".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(serde_json::json!({
                "success": false,
                "error": message,
            })),
        )
            .into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
