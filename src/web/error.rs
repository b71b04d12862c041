use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::services::error::StatusError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error("Malformed request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        use StatusError::*;
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Status(err) => match err {
                CredentialNotFound { .. } | LedgerEntryNotFound(_) | PageNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                DuplicateCredential(_) | DuplicateBinding { .. } => StatusCode::CONFLICT,
                AllocationExhausted { .. } | RefreshConflict(_) => StatusCode::SERVICE_UNAVAILABLE,
                InvalidCapacity(_) => StatusCode::BAD_REQUEST,
                Codec { .. } | Signing(_) | Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            tracing::error!("Request failed: {self}");
        }
        let body = if status_code == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status_code, body).into_response()
    }
}
