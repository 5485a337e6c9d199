//! Admin token guard for the read endpoints

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::state::AppState;

/// Extract bearer token from Authorization header
fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
}

/// Middleware that requires `Authorization: Bearer <ADMIN_API_TOKEN>`.
///
/// When no admin token is configured the guarded routes answer 404.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(expected) = state.config.admin_api_token.as_deref() else {
        tracing::debug!(path = %path, "Admin API disabled - no token configured");
        return ApiError::NotFound("Not found".to_string()).into_response();
    };

    let authorized = extract_bearer_token(&request)
        .map(|token| bool::from(token.as_bytes().ct_eq(expected.as_bytes())))
        .unwrap_or(false);

    if !authorized {
        tracing::warn!(path = %path, "require_admin_token: authentication failed");
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}
