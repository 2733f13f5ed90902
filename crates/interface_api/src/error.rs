//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain_billing::BillingError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", "Unauthorized".to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg.clone()),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation(message) => ApiError::Validation(message),
            BillingError::Calculation(e) => ApiError::Validation(e.to_string()),
            BillingError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            BillingError::Conflict(message) => ApiError::Conflict(message),
            other => {
                error!(error = %other, "billing operation failed");
                // Store and transaction details stay in the log
                ApiError::Internal("billing operation failed".to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingPermission(role) => ApiError::Forbidden(format!("missing permission {}", role)),
            AuthError::InvalidToken | AuthError::TokenExpired => ApiError::Unauthorized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::PortError;

    #[test]
    fn test_billing_errors_map_to_status_codes() {
        let cases = [
            (BillingError::validation("bad range"), StatusCode::UNPROCESSABLE_ENTITY),
            (BillingError::not_found("Invoice", 4), StatusCode::NOT_FOUND),
            (BillingError::Conflict("already billed".to_string()), StatusCode::CONFLICT),
            (BillingError::from(PortError::conflict("already credited")), StatusCode::CONFLICT),
            (BillingError::Transaction("commit failed".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
            (BillingError::Storage(PortError::internal("boom")), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).into_response().status(), status);
        }
    }

    #[test]
    fn test_missing_permission_is_forbidden() {
        let error = ApiError::from(AuthError::MissingPermission("payment:write".to_string()));
        assert_eq!(error.into_response().status(), StatusCode::FORBIDDEN);
    }
}
