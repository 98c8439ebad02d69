//! HTTP error taxonomy shared by every handler.
//!
//! Each variant maps to one status code and renders the `{"error": "..."}`
//! envelope. `Unexpected` logs the underlying error and only returns the
//! caller-facing message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("This request has already been reviewed")]
    AlreadyReviewed,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Unexpected {
        message: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub fn admin_required() -> Self {
        Self::Forbidden("Forbidden: Admin access required".to_string())
    }

    pub fn unexpected(message: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected {
            message,
            source: source.into(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::AlreadyReviewed => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unexpected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Unexpected { message, source } = &self {
            error!("{message}: {source:#}");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Attach a caller-facing message to a store failure.
pub trait ResultExt<T> {
    /// # Errors
    /// Converts the error into `ApiError::Unexpected` with `message`.
    fn or_unexpected(self, message: &'static str) -> Result<T, ApiError>;
}

impl<T> ResultExt<T> for anyhow::Result<T> {
    fn or_unexpected(self, message: &'static str) -> Result<T, ApiError> {
        self.map_err(|source| ApiError::unexpected(message, source))
    }
}
