//! Error types for Bookledger server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error codes exposed in error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchData = 4,
    Exhausted = 5,
    AlreadyBorrowed = 6,
    AlreadyReturned = 7,
    BadValue = 8,
    Duplicate = 9,
    ConstraintViolation = 10,
    CompensationFailed = 11,
    Indeterminate = 12,
    Unavailable = 13,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No copies available for book {0}")]
    Exhausted(String),

    #[error("Book {book_id} is already borrowed by user {user_id}")]
    AlreadyBorrowed { user_id: String, book_id: String },

    #[error("Loan {0} already returned")]
    AlreadyReturned(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Conditional update lost against a concurrent transition
    #[error("Loan {loan_id} is {actual}, expected {expected}")]
    StatusMismatch {
        loan_id: String,
        expected: String,
        actual: String,
    },

    /// Store refused an adjustment outside `[0, total_copies]`
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A reservation could not be undone; availability may have drifted
    #[error("Compensation failed: {0}")]
    CompensationFailed(String),

    /// Operation timed out before the store confirmed it
    #[error("Operation outcome unknown: {0}")]
    Indeterminate(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Client errors are expected outcomes of a well-formed request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Authentication(_)
                | AppError::Forbidden(_)
                | AppError::NotFound(_)
                | AppError::Exhausted(_)
                | AppError::AlreadyBorrowed { .. }
                | AppError::AlreadyReturned(_)
                | AppError::Validation(_)
                | AppError::Conflict(_)
        )
    }

    /// Store failures that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Unavailable(_) | AppError::Database(_))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, code) = match &self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchData),
            AppError::Exhausted(_) => (StatusCode::CONFLICT, ErrorCode::Exhausted),
            AppError::AlreadyBorrowed { .. } => (StatusCode::CONFLICT, ErrorCode::AlreadyBorrowed),
            AppError::AlreadyReturned(_) => (StatusCode::CONFLICT, ErrorCode::AlreadyReturned),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::Duplicate),
            AppError::StatusMismatch { .. } => {
                tracing::error!("Unresolved status mismatch: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure)
            }
            AppError::ConstraintViolation(_) => {
                tracing::error!("Ledger constraint violation: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::ConstraintViolation)
            }
            AppError::CompensationFailed(_) => {
                tracing::error!("Compensation failed: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::CompensationFailed)
            }
            AppError::Indeterminate(_) => (StatusCode::GATEWAY_TIMEOUT, ErrorCode::Indeterminate),
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::Unavailable),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                return error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                );
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                return error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                );
            }
        };

        error_body(status, code, message)
    }
}

fn error_body(status: StatusCode, code: ErrorCode, message: String) -> Response {
    let body = Json(ErrorResponse {
        code: code as u32,
        error: format!("{:?}", code),
        message,
    });

    (status, body).into_response()
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
