//! Read-side subscription queries
//!
//! Answers "what does this organization have access to" from the metadata
//! document the pipeline maintains. Nothing here writes.

use std::sync::Arc;

use crate::correlation::CorrelationStore;
use crate::error::SyncResult;
use crate::metadata::{
    active_product_ids, active_subscription_for_product, list_active_subscriptions,
    MetadataDocument, SubscriptionRecord,
};
use crate::providers::IdentityProvider;
use crate::webhooks::unix_now;

#[derive(Clone)]
pub struct SubscriptionAccess {
    identity: Arc<dyn IdentityProvider>,
    correlations: Arc<dyn CorrelationStore>,
}

impl SubscriptionAccess {
    pub fn new(identity: Arc<dyn IdentityProvider>, correlations: Arc<dyn CorrelationStore>) -> Self {
        Self {
            identity,
            correlations,
        }
    }

    async fn document(&self, organization_id: &str) -> SyncResult<MetadataDocument> {
        self.identity
            .fetch_organization_metadata(organization_id)
            .await
    }

    pub async fn active_subscriptions_for_organization(
        &self,
        organization_id: &str,
    ) -> SyncResult<Vec<SubscriptionRecord>> {
        let doc = self.document(organization_id).await?;
        Ok(list_active_subscriptions(&doc, unix_now())
            .into_iter()
            .cloned()
            .collect())
    }

    /// Resolves the organization through the correlation table first
    pub async fn active_subscriptions_for_customer(
        &self,
        customer_id: &str,
    ) -> SyncResult<Vec<SubscriptionRecord>> {
        let organization_id = self.correlations.get_by_customer_id(customer_id).await?;
        self.active_subscriptions_for_organization(&organization_id)
            .await
    }

    pub async fn has_access(&self, organization_id: &str, product_id: &str) -> SyncResult<bool> {
        Ok(self
            .subscription_details(organization_id, product_id)
            .await?
            .is_some())
    }

    pub async fn active_products(&self, organization_id: &str) -> SyncResult<Vec<String>> {
        let doc = self.document(organization_id).await?;
        Ok(active_product_ids(&doc, unix_now())
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// The active subscription granting `product_id`, if any
    pub async fn subscription_details(
        &self,
        organization_id: &str,
        product_id: &str,
    ) -> SyncResult<Option<SubscriptionRecord>> {
        let doc = self.document(organization_id).await?;
        Ok(active_subscription_for_product(&doc, product_id, unix_now()).cloned())
    }

    pub async fn customer_id_for_organization(&self, organization_id: &str) -> SyncResult<String> {
        self.correlations
            .get_by_organization_id(organization_id)
            .await
    }
}
