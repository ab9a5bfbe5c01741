use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shule_core::error::{self, ApiError};
use shule_core::{AssistantError, BackendError};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        docs_hint: Option<String>,
    },
    /// Missing or malformed bearer token (401)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Unknown or expired session (404)
    NotFound { resource: String },
    /// A previous turn on the same session is still running (409)
    Busy,
    /// The school API rejected or failed the identity lookup (502)
    Upstream(BackendError),
    /// Session table is full (503)
    CapacityExhausted { limit: usize },
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, code, message, field, docs_hint) = match self {
            AppError::Validation {
                message,
                field,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                error::codes::VALIDATION_FAILED,
                message,
                field,
                docs_hint,
            ),
            AppError::Unauthorized { message, docs_hint } => (
                StatusCode::UNAUTHORIZED,
                error::codes::UNAUTHORIZED,
                message,
                None,
                docs_hint,
            ),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                error::codes::NOT_FOUND,
                format!("{resource} not found"),
                None,
                Some("Sessions end when deleted or when the gateway restarts. Create a new one.".to_string()),
            ),
            AppError::Busy => (
                StatusCode::CONFLICT,
                error::codes::BUSY,
                AssistantError::Busy.to_string(),
                None,
                Some("Wait for the previous reply before sending the next message.".to_string()),
            ),
            AppError::Upstream(err) => {
                tracing::warn!(error = %err, "school api call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    error::codes::UPSTREAM_FAILED,
                    err.user_message(),
                    None,
                    None,
                )
            }
            AppError::CapacityExhausted { limit } => (
                StatusCode::SERVICE_UNAVAILABLE,
                error::codes::CAPACITY_EXHAUSTED,
                format!("The assistant is serving its maximum of {limit} sessions"),
                None,
                Some("Close an unused session or retry later.".to_string()),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error::codes::INTERNAL_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                    None,
                )
            }
        };

        let body = ApiError {
            error: code.to_string(),
            message,
            field,
            request_id,
            docs_hint,
        };
        (status, Json(body)).into_response()
    }
}

impl From<AssistantError> for AppError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::Busy => AppError::Busy,
            AssistantError::NoActiveFlow => AppError::Validation {
                message: err.to_string(),
                field: None,
                docs_hint: Some("Start a form first, e.g. \"create exam\" or \"add student\".".to_string()),
            },
            AssistantError::UnknownFlowField { ref key, .. } => AppError::Validation {
                field: Some(key.clone()),
                message: err.to_string(),
                docs_hint: None,
            },
        }
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Upstream(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_errors_map_to_statuses() {
        assert_eq!(AppError::from(AssistantError::Busy).into_response().status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(AssistantError::NoActiveFlow).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        let unknown = AppError::from(AssistantError::UnknownFlowField {
            flow: "create_exam",
            key: "colour".to_string(),
        });
        assert!(matches!(&unknown, AppError::Validation { field: Some(f), .. } if f == "colour"));
    }

    #[test]
    fn backend_failures_are_bad_gateway() {
        let err = AppError::from(BackendError::Http {
            status: 401,
            message: "Invalid token".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::CapacityExhausted { limit: 2 }.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
