//! HTTP routes

pub mod health;
pub mod subscriptions;
pub mod webhooks;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::auth::require_admin_token;
use crate::state::AppState;

pub use webhooks::WEBHOOK_BODY_LIMIT;

pub fn create_router(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .route("/webhooks/clerk", post(webhooks::clerk_webhook))
        .layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT));

    let admin_routes = Router::new()
        .route(
            "/v1/organizations/{organization_id}/subscriptions",
            get(subscriptions::list_active_subscriptions),
        )
        .route(
            "/v1/organizations/{organization_id}/customer",
            get(subscriptions::get_customer),
        )
        .route(
            "/v1/organizations/{organization_id}/access/{product_id}",
            get(subscriptions::check_access),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(webhook_routes)
        .merge(admin_routes)
        .with_state(state)
}
