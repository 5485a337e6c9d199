//! Error types for the sync core

use thiserror::Error;

/// Errors raised while ingesting webhooks and reconciling organization state.
///
/// Payloads are plain strings so the error can be cloned into a
/// [`ProcessingOutcome`](crate::webhooks::ProcessingOutcome) and compared in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Normal dedup outcome, never surfaced as a failure
    #[error("Duplicate delivery of event {0}")]
    DuplicateDelivery(String),

    #[error("No correlation found: {0}")]
    CorrelationNotFound(String),

    #[error("Correlation already exists: {0}")]
    DuplicateKey(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Malformed organization metadata: {0}")]
    MalformedMetadata(String),

    #[error("{provider} call failed: {message}")]
    RemoteCall { provider: String, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn remote(provider: &str, message: impl Into<String>) -> Self {
        Self::RemoteCall {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Stable label for logs and API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::DuplicateDelivery(_) => "duplicate_delivery",
            SyncError::CorrelationNotFound(_) => "correlation_not_found",
            SyncError::DuplicateKey(_) => "duplicate_key",
            SyncError::MalformedPayload(_) => "malformed_payload",
            SyncError::MalformedMetadata(_) => "malformed_metadata",
            SyncError::RemoteCall { .. } => "remote_call_failure",
            SyncError::Database(_) => "database",
            SyncError::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                SyncError::DuplicateKey(db_err.message().to_string())
            }
            _ => SyncError::Database(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for SyncError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        SyncError::Database(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
