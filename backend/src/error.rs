//! Error handling for Stockroom
//!
//! Provides one error type for the receipt engine, its stores, and the HTTP
//! layer, with consistent JSON error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Concurrent mutation prevented a commit; the whole call may be retried
    #[error("Conflict: {0}")]
    Conflict(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Error returned when a serial number already exists in the ledger
    pub fn duplicate_serial(serial_number: Option<&str>) -> Self {
        match serial_number {
            Some(sn) => AppError::ValidationError(format!("duplicate serial number: {}", sn)),
            None => AppError::ValidationError("duplicate serial number".to_string()),
        }
    }

    /// Error returned when a cancel would drive stock below zero
    pub fn insufficient_stock(detail: impl std::fmt::Display) -> Self {
        AppError::InvalidState(format!("insufficient stock to cancel: {}", detail))
    }

    /// Only conflicts are expected to succeed when retried unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }

    /// Stable machine-readable code for the error
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::Conflict(_) => "CONFLICT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let first = errors
            .field_errors()
            .into_iter()
            .find_map(|(field, errs)| errs.first().map(|e| (field, e.clone())));

        match first {
            Some((field, err)) => AppError::Validation {
                field: field.to_string(),
                message: err
                    .message
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string()),
            },
            None => AppError::ValidationError(errors.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation { .. } | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DatabaseError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let (message, field) = match &self {
            AppError::Validation { field, message } => (message.clone(), Some(field.clone())),
            AppError::ValidationError(msg) => (msg.clone(), None),
            AppError::NotFound(resource) => (format!("{} not found", resource), None),
            AppError::InvalidState(msg) => (msg.clone(), None),
            AppError::Conflict(msg) => (msg.clone(), None),
            AppError::DatabaseError(_) => ("A database error occurred".to_string(), None),
            AppError::Internal(msg) => (msg.clone(), None),
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        let detail = ErrorDetail {
            code: self.code().to_string(),
            message,
            field,
        };

        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// Result type alias for handlers and services
pub type AppResult<T> = Result<T, AppError>;
