use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use roomdrop_common::error::StorageError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Storage(StorageError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Storage(StorageError::BackendUnavailable(_)) => {
                (StatusCode::BAD_GATEWAY, "Storage backend unavailable".to_string())
            }
            ApiError::Storage(StorageError::UploadFailed(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Upload failed".to_string())
            }
            ApiError::Storage(StorageError::ListPartial(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch files".to_string())
            }
            ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
