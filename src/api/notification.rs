//! User-visible notifications and the error-to-response mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::error::{DatabaseError, Error, LlmError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationVariant {
    Default,
    Destructive,
}

/// Toast-style message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub variant: NotificationVariant,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            variant: NotificationVariant::Default,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            variant: NotificationVariant::Destructive,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// An error rendered as an HTTP status plus a destructive notification.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub notification: Notification,
}

impl ApiError {
    pub fn new(status: StatusCode, title: &str, description: impl Into<String>) -> Self {
        Self {
            status,
            notification: Notification::destructive(title, description),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "Not Signed In",
            "Please sign in to continue.",
        )
    }

    pub fn unavailable(description: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "Unavailable", description)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let (status, title) = match &err {
            ValidationError::Csv(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CSV Parsing Error"),
            ValidationError::MissingCsvColumn => (StatusCode::UNPROCESSABLE_ENTITY, "Error"),
            ValidationError::RunInProgress { .. } => (StatusCode::CONFLICT, "Extraction Failed"),
            _ => (StatusCode::BAD_REQUEST, "Error"),
        };
        Self::new(status, title, err.to_string())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(e) => e.into(),
            Error::Database(DatabaseError::NotFound { .. }) => {
                Self::new(StatusCode::NOT_FOUND, "Not Found", "That campaign no longer exists.")
            }
            Error::Database(DatabaseError::Conflict { .. }) => Self::new(
                StatusCode::CONFLICT,
                "Conflict",
                "The campaign was changed by someone else. Please refresh and try again.",
            ),
            Error::Database(e) => {
                error!(error = %e, "Store error in request");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error",
                    "Something went wrong while saving. Please try again.",
                )
            }
            Error::PartialImport { campaign_id, source } => {
                error!(campaign_id = %campaign_id, error = %source, "Partial import");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error",
                    format!(
                        "The campaign was created but its leads could not be saved (campaign {campaign_id})."
                    ),
                )
            }
            Error::Generation(LlmError::Timeout { .. }) => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                "Error",
                "The AI took too long to respond. Please try again.",
            ),
            Error::Generation(LlmError::RateLimited { .. }) => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                "Error",
                "The AI is busy right now. Please wait a moment and try again.",
            ),
            Error::Generation(e) => {
                error!(error = %e, "Generation error in request");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    "Error",
                    "Failed to generate a message. Please try again.",
                )
            }
            Error::Cancelled { .. } => Self::new(
                StatusCode::CONFLICT,
                "Cancelled",
                "The campaign was removed while it was running.",
            ),
            Error::Config(e) => {
                error!(error = %e, "Configuration error in request");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Error", e.to_string())
            }
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        Error::Generation(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "notification": self.notification })),
        )
            .into_response()
    }
}
