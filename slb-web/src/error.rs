//! Error types for slb-web
//!
//! Handlers return [`ApiResult`]; every error becomes a JSON body of the form
//! `{"error": {"code": ..., "message": ...}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use slb_common::Error as CommonError;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed path or body the extractors accepted (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// slb-common error, mapped by kind
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl ApiError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Common(err) => {
                let (status, code) = match &err {
                    CommonError::UnknownAcknowledgmentTarget { .. } => {
                        (StatusCode::CONFLICT, "UNKNOWN_ACKNOWLEDGMENT_TARGET")
                    }
                    CommonError::RegistryWriteConflict(_) => {
                        (StatusCode::CONFLICT, "REGISTRY_WRITE_CONFLICT")
                    }
                    CommonError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    CommonError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
                    CommonError::StoreUnreadable(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "STORE_UNREADABLE")
                    }
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
                };
                (status, code, err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!("{}: {}", error_code, message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
