//! Organization subscription read endpoints (admin token required)

use axum::extract::{Path, State};
use axum::Json;
use orgsync_billing::SubscriptionRecord;
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubscriptionsResponse {
    pub organization_id: String,
    pub subscriptions: Vec<SubscriptionRecord>,
}

#[derive(Debug, Serialize)]
pub struct CustomerResponse {
    pub organization_id: String,
    pub customer_id: String,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub organization_id: String,
    pub product_id: String,
    pub has_access: bool,
    pub subscription: Option<SubscriptionRecord>,
}

/// GET /v1/organizations/{organization_id}/subscriptions
pub async fn list_active_subscriptions(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> ApiResult<Json<SubscriptionsResponse>> {
    let subscriptions = state
        .access
        .active_subscriptions_for_organization(&organization_id)
        .await?;

    Ok(Json(SubscriptionsResponse {
        organization_id,
        subscriptions,
    }))
}

/// GET /v1/organizations/{organization_id}/customer
pub async fn get_customer(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> ApiResult<Json<CustomerResponse>> {
    let customer_id = state
        .access
        .customer_id_for_organization(&organization_id)
        .await?;

    Ok(Json(CustomerResponse {
        organization_id,
        customer_id,
    }))
}

/// GET /v1/organizations/{organization_id}/access/{product_id}
pub async fn check_access(
    State(state): State<AppState>,
    Path((organization_id, product_id)): Path<(String, String)>,
) -> ApiResult<Json<AccessResponse>> {
    let subscription = state
        .access
        .subscription_details(&organization_id, &product_id)
        .await?;

    Ok(Json(AccessResponse {
        has_access: subscription.is_some(),
        organization_id,
        product_id,
        subscription,
    }))
}
