use serde::Serialize;
use utoipa::ToSchema;

/// Structured error body returned by the assistant gateway.
/// Carries enough detail for the console to show the problem next to the right control.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "not_found", "busy")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the gateway
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const BUSY: &str = "busy";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const UPSTREAM_FAILED: &str = "upstream_failed";
    pub const CAPACITY_EXHAUSTED: &str = "capacity_exhausted";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Failure reported by one of the school services.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// The service answered with a non-success status.
    #[error("{message}")]
    Http { status: u16, message: String },
    /// The service could not be reached.
    #[error("could not reach the school service: {0}")]
    Transport(String),
    /// The service answered with a body we could not understand.
    #[error("unexpected response from the school service: {0}")]
    Decode(String),
}

impl BackendError {
    /// The message shown to the operator: service detail when there is one.
    pub fn user_message(&self) -> String {
        match self {
            BackendError::Http { message, .. } if !message.trim().is_empty() => message.clone(),
            BackendError::Http { status, .. } => format!("request failed with status {status}"),
            other => other.to_string(),
        }
    }
}

/// Errors surfaced to the host, outside of a turn's reply.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssistantError {
    #[error("the assistant is still working on the previous message")]
    Busy,
    #[error("there is no form in progress")]
    NoActiveFlow,
    #[error("'{key}' is not a field of the {flow} form")]
    UnknownFlowField { flow: &'static str, key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_prefers_service_detail() {
        let err = BackendError::Http {
            status: 400,
            message: "Exam already published".to_string(),
        };
        assert_eq!(err.user_message(), "Exam already published");
    }

    #[test]
    fn http_error_without_detail_uses_status() {
        let err = BackendError::Http {
            status: 502,
            message: "  ".to_string(),
        };
        assert_eq!(err.user_message(), "request failed with status 502");
    }

    #[test]
    fn api_error_omits_empty_optionals() {
        let body = serde_json::to_value(ApiError {
            error: codes::BUSY.to_string(),
            message: "busy".to_string(),
            field: None,
            request_id: "r-1".to_string(),
            docs_hint: None,
        })
        .expect("serializable");
        assert!(body.get("field").is_none());
        assert!(body.get("docs_hint").is_none());
        assert_eq!(body["error"], "busy");
    }
}
