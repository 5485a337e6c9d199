//! Request authentication for webhooks and admin reads

#[cfg(test)]
mod edge_case_tests;
pub mod middleware;
pub mod stripe_signature;
pub mod svix;

use axum::http::StatusCode;
use thiserror::Error;

pub use middleware::require_admin_token;
pub use stripe_signature::verify_stripe_signature;
pub use svix::verify_svix_signature;

/// Maximum age difference between a signed timestamp and now
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Missing {0} header")]
    MissingHeader(&'static str),

    #[error("Malformed signature header: {0}")]
    MalformedHeader(String),

    #[error("Signature timestamp {timestamp} outside tolerance (now {now})")]
    TimestampOutOfTolerance { timestamp: i64, now: i64 },

    #[error("No signature matched the payload")]
    Mismatch,

    #[error("Webhook signing secret is unusable")]
    InvalidSecret,
}

impl SignatureError {
    pub fn status(&self) -> StatusCode {
        match self {
            SignatureError::MissingHeader(_) | SignatureError::MalformedHeader(_) => {
                StatusCode::BAD_REQUEST
            }
            SignatureError::TimestampOutOfTolerance { .. } | SignatureError::Mismatch => {
                StatusCode::UNAUTHORIZED
            }
            SignatureError::InvalidSecret => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn check_tolerance(timestamp: i64, now: i64) -> Result<(), SignatureError> {
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::TimestampOutOfTolerance { timestamp, now });
    }
    Ok(())
}
