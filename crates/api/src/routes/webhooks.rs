//! Webhook endpoints
//!
//! Verify the provider signature over the raw body, unwrap the provider's
//! envelope into a [`WebhookEvent`], and wait for the pipeline's outcome so
//! the provider is only acknowledged once the event is handled.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use orgsync_billing::webhooks::unix_now;
use orgsync_billing::{ProcessingOutcome, WebhookEvent};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::svix::{SVIX_ID, SVIX_SIGNATURE, SVIX_TIMESTAMP};
use crate::auth::{verify_stripe_signature, verify_svix_signature, SignatureError};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Largest accepted webhook body
pub const WEBHOOK_BODY_LIMIT: usize = 64 * 1024;

const STRIPE_SIGNATURE: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
struct StripeEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: Value,
}

#[derive(Debug, Deserialize)]
struct ClerkEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Value,
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or(SignatureError::MissingHeader(name))
}

/// POST /webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let signature = header(&headers, STRIPE_SIGNATURE)?;
    verify_stripe_signature(
        &body,
        signature,
        &state.config.stripe.webhook_secret,
        unix_now(),
    )?;

    let envelope: StripeEnvelope = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid Stripe event: {}", e)))?;

    tracing::info!(
        event_id = %envelope.id,
        event_type = %envelope.event_type,
        "Received Stripe webhook"
    );

    let event = WebhookEvent::new(envelope.id, envelope.event_type, envelope.data.object);
    dispatch(&state, event).await
}

/// POST /webhooks/clerk
pub async fn clerk_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let message_id = header(&headers, SVIX_ID)?;
    let timestamp = header(&headers, SVIX_TIMESTAMP)?;
    let signature = header(&headers, SVIX_SIGNATURE)?;

    verify_svix_signature(
        message_id,
        timestamp,
        signature,
        &body,
        &state.config.clerk.webhook_secret,
        unix_now(),
    )?;

    let envelope: ClerkEnvelope = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid Clerk event: {}", e)))?;

    tracing::info!(
        event_id = %message_id,
        event_type = %envelope.event_type,
        "Received Clerk webhook"
    );

    // Svix reuses the message id on redelivery, so it is the dedup key
    let event = WebhookEvent::new(message_id, envelope.event_type, envelope.data);
    dispatch(&state, event).await
}

async fn dispatch(state: &AppState, event: WebhookEvent) -> ApiResult<Response> {
    let pending = state.dispatcher.submit(event)?;

    match pending.wait().await {
        ProcessingOutcome::Failed(e) => Err(ApiError::EventFailed(e)),
        outcome => Ok((
            StatusCode::OK,
            Json(json!({ "received": true, "outcome": outcome.label() })),
        )
            .into_response()),
    }
}
