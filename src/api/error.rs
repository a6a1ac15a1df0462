use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;
use tracing::error;

use super::models::{ErrorResponse, FieldIssue, ValidationErrorResponse};
use super::validation::TransactionValidationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<FieldIssue>),

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("invalid request: {0}")]
    InvalidPayload(String),

    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TransactionValidationError> for ApiError {
    fn from(err: TransactionValidationError) -> Self {
        let TransactionValidationError::Invalid(issues) = err;
        ApiError::Validation(issues)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::StoreUnavailable(_) | ApiError::QueueUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        if let ApiError::Internal(ref detail) = self {
            error!(error = %detail, "unexpected internal error");
        }

        if let ApiError::Validation(details) = self {
            let body = ValidationErrorResponse {
                error: "Validation failed",
                details,
            };
            return (status, Json(body)).into_response();
        }

        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
