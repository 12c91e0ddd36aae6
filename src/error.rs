// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use validator::ValidationErrors;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("OAuth provider error: {0}")]
    OAuthProvider(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    /// Per-field messages for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, Vec<String>>>,
}

/// Flatten validator output into `field -> [message]`.
pub fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details, fields) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None, None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None, None),
            AppError::InvalidCredentials(msg) => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                Some(msg.clone()),
                None,
            ),
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                None,
                Some(field_messages(errors)),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone()), None),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()), None)
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone()), None),
            AppError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage error");
                (StatusCode::BAD_GATEWAY, "storage_error", Some(msg.clone()), None)
            }
            AppError::OAuthProvider(msg) => {
                tracing::warn!(error = %msg, "OAuth provider error");
                (StatusCode::BAD_GATEWAY, "oauth_error", Some(msg.clone()), None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None, None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            fields,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<crate::db::RepositoryError> for AppError {
    fn from(err: crate::db::RepositoryError) -> Self {
        use crate::db::RepositoryError;
        match err {
            RepositoryError::DuplicateEmail(email) => {
                AppError::Conflict(format!("Email already registered: {}", email))
            }
            RepositoryError::NotFound(id) => AppError::NotFound(format!("User {} not found", id)),
        }
    }
}

impl From<crate::services::storage::StorageError> for AppError {
    fn from(err: crate::services::storage::StorageError) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<crate::services::password::PasswordError> for AppError {
    fn from(err: crate::services::password::PasswordError) -> Self {
        AppError::Internal(err.into())
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
