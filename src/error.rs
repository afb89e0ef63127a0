// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::{models::notice::Notice, store::StoreError};

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request (validation failures, closed question windows)
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., another quiz already running, attempt already finished)
    Conflict(String),

    // 409 Conflict carrying a confirmation prompt for destructive actions
    ConfirmationRequired { action: String, message: String },

    // 503 Service Unavailable: the store failed while performing a named action
    ActionFailed { action: String, cause: String },
}

impl AppError {
    /// Attaches the name of the user action to a store failure.
    ///
    /// Missing records stay `NotFound`; everything else becomes `ActionFailed`
    /// so the UI can say which action did not go through.
    pub fn action_failed(action: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => {
                AppError::NotFound(format!("{} '{}' not found", collection, id))
            }
            other => {
                tracing::error!("Failed to {}: {}", action, other);
                AppError::ActionFailed {
                    action: action.to_string(),
                    cause: other.to_string(),
                }
            }
        }
    }

    /// The notice shown to the user for this error.
    pub fn notice(&self) -> Notice {
        match self {
            AppError::InternalServerError(_) => {
                Notice::error("Something went wrong", "Internal Server Error")
            }
            AppError::BadRequest(msg) => Notice::error("Invalid request", msg.clone()),
            AppError::AuthError(msg) => Notice::error("Not authorized", msg.clone()),
            AppError::NotFound(msg) => Notice::error("Not found", msg.clone()),
            AppError::Conflict(msg) => Notice::error("Action not allowed", msg.clone()),
            AppError::ConfirmationRequired { action, message } => {
                Notice::confirm(action.clone(), message.clone())
            }
            AppError::ActionFailed { action, cause } => {
                Notice::error(format!("Could not {}", action), cause.clone())
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let notice = self.notice();
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::ConfirmationRequired { message, .. } => (StatusCode::CONFLICT, message),
            AppError::ActionFailed { action, cause } => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Failed to {}: {}", action, cause),
            ),
        };
        let body = Json(json!({
            "error": error_message,
            "notice": notice,
        }));

        (status, body).into_response()
    }
}

/// Converts `StoreError` into the matching `AppError`.
/// Allows using `?` operator on store calls that are not tied to a user action.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => {
                AppError::NotFound(format!("{} '{}' not found", collection, id))
            }
            StoreError::AlreadyExists { collection, id } => {
                AppError::Conflict(format!("{} '{}' already exists", collection, id))
            }
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
