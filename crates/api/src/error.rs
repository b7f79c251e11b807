//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use billflow_billing::BillingError;
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed request fields
    #[error("{0}")]
    Validation(String),

    /// Requested resource does not exist
    #[error("{0}")]
    NotFound(String),

    /// Missing or wrong API key
    #[error("Acesso não autorizado.")]
    Unauthorized,

    /// Webhook signature rejected
    #[error("{0}")]
    Webhook(String),

    /// Failure from the billing provider. `message` is the generic
    /// user-facing string for the route, `details` the stage-specific
    /// one surfaced by the core.
    #[error("{message}")]
    Provider {
        message: &'static str,
        details: String,
    },
}

impl ApiError {
    /// Wrap a billing failure under the route's generic message,
    /// keeping the core's stage message as `details`.
    pub fn provider(message: &'static str, err: BillingError) -> Self {
        let details = match err {
            BillingError::Provider { message, .. } => message,
            other => other.to_string(),
        };
        ApiError::Provider { message, details }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Single sink: every surfaced error is observed here before the
        // response body is produced.
        let (status, body) = match &self {
            ApiError::Validation(message) => {
                tracing::warn!(error = %message, "Request validation failed");
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ApiError::NotFound(message) => {
                tracing::warn!(error = %message, "Resource not found");
                (StatusCode::NOT_FOUND, json!({ "error": message }))
            }
            ApiError::Unauthorized => {
                tracing::warn!("Rejected request with missing or invalid API key");
                (
                    StatusCode::UNAUTHORIZED,
                    json!({ "error": self.to_string() }),
                )
            }
            ApiError::Webhook(message) => {
                tracing::warn!(error = %message, "Webhook verification failed");
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ApiError::Provider { message, details } => {
                tracing::error!(error = %message, details = %details, "Provider operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": message, "details": details }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
