//! Error types for the Dropbay server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    Validation(String),

    #[error("Path confinement violation: {0}")]
    PathViolation(String),

    #[error("Chunk transfer error: {0}")]
    Chunk(String),

    #[error("Missing chunk {0}")]
    MissingChunk(usize),

    #[error("File type rejected: {0}")]
    TypeRejected(String),

    #[error("File too large: {size} bytes (max: {max})")]
    SizeExceeded { size: u64, max: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Requested range not satisfiable: offset {start} beyond size {size}")]
    Range { start: u64, size: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Error response body
///
/// Carries `ok: false` so the upload-action endpoints keep the
/// `{ok, error}` shape the web client expects.
#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
    message: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PathViolation(_) => StatusCode::BAD_REQUEST,
            Self::Chunk(_) => StatusCode::BAD_REQUEST,
            Self::MissingChunk(_) => StatusCode::CONFLICT,
            Self::TypeRejected(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::SizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Range { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "bad_request",
            Self::PathViolation(_) => "path_violation",
            Self::Chunk(_) => "chunk_error",
            Self::MissingChunk(_) => "missing_chunk",
            Self::TypeRejected(_) => "type_rejected",
            Self::SizeExceeded { .. } => "size_exceeded",
            Self::NotFound(_) => "not_found",
            Self::Range { .. } => "range_error",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            // A confinement violation means a client-supplied identifier
            // tried to escape its root. Treated as a possible attack.
            AppError::PathViolation(detail) => {
                tracing::warn!(detail = %detail, "path confinement violation");
                "Invalid identifier".to_string()
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                "Storage error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            ok: false,
            error: self.code().to_string(),
            message,
        });

        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            AppError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Range { start: 10, size: 5 }.status(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(
            AppError::SizeExceeded { size: 2, max: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AppError::MissingChunk(3).status(),
            StatusCode::CONFLICT
        );
    }
}
