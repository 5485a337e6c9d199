//! API error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orgsync_billing::{DispatchError, SyncError};
use serde_json::json;
use thiserror::Error;

use crate::auth::SignatureError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Signature(#[from] SignatureError),

    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The pipeline finished the event as failed; the provider should redeliver
    #[error("Event processing failed: {0}")]
    EventFailed(SyncError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Signature(e) => e.status(),
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Dispatch(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Sync(SyncError::CorrelationNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Sync(SyncError::MalformedPayload(_)) => StatusCode::BAD_REQUEST,
            ApiError::Sync(SyncError::RemoteCall { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Sync(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::EventFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label for the `error` field
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Signature(_) => "invalid_signature",
            ApiError::Unauthorized => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::Dispatch(DispatchError::QueueFull) => "queue_full",
            ApiError::Dispatch(DispatchError::ShuttingDown) => "shutting_down",
            ApiError::Sync(e) | ApiError::EventFailed(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error_kind = self.kind(), error = %self, "Request failed");
        }

        // Database and internal details stay in the logs
        let message = match &self {
            ApiError::Sync(SyncError::Database(_))
            | ApiError::Sync(SyncError::Internal(_))
            | ApiError::EventFailed(SyncError::Database(_))
            | ApiError::EventFailed(SyncError::Internal(_)) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": self.kind(),
            "message": message,
        }));

        (status, body).into_response()
    }
}
