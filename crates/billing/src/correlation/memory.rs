//! In-memory correlation store for tests and local runs

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CorrelationRecord, CorrelationStore};
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Default)]
struct Links {
    by_organization: HashMap<String, String>,
    by_customer: HashMap<String, String>,
}

/// Both directions live under one lock so every mutation is atomic
#[derive(Debug, Default)]
pub struct InMemoryCorrelationStore {
    links: RwLock<Links>,
}

impl InMemoryCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.links.read().await.by_organization.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CorrelationStore for InMemoryCorrelationStore {
    async fn create(
        &self,
        organization_id: &str,
        customer_id: &str,
    ) -> SyncResult<CorrelationRecord> {
        let mut links = self.links.write().await;

        if links.by_organization.contains_key(organization_id) {
            return Err(SyncError::DuplicateKey(format!(
                "organization {} already linked",
                organization_id
            )));
        }
        if links.by_customer.contains_key(customer_id) {
            return Err(SyncError::DuplicateKey(format!(
                "customer {} already linked",
                customer_id
            )));
        }

        links
            .by_organization
            .insert(organization_id.to_string(), customer_id.to_string());
        links
            .by_customer
            .insert(customer_id.to_string(), organization_id.to_string());

        Ok(CorrelationRecord {
            organization_id: organization_id.to_string(),
            customer_id: customer_id.to_string(),
        })
    }

    async fn get(&self, organization_id: &str) -> SyncResult<CorrelationRecord> {
        let links = self.links.read().await;
        links
            .by_organization
            .get(organization_id)
            .map(|customer_id| CorrelationRecord {
                organization_id: organization_id.to_string(),
                customer_id: customer_id.clone(),
            })
            .ok_or_else(|| {
                SyncError::CorrelationNotFound(format!("organization {}", organization_id))
            })
    }

    async fn get_by_customer_id(&self, customer_id: &str) -> SyncResult<String> {
        let links = self.links.read().await;
        links
            .by_customer
            .get(customer_id)
            .cloned()
            .ok_or_else(|| SyncError::CorrelationNotFound(format!("customer {}", customer_id)))
    }

    async fn delete_by_organization_id(&self, organization_id: &str) -> SyncResult<()> {
        let mut links = self.links.write().await;
        if let Some(customer_id) = links.by_organization.remove(organization_id) {
            links.by_customer.remove(&customer_id);
        }
        Ok(())
    }

    async fn delete_by_customer_id(&self, customer_id: &str) -> SyncResult<()> {
        let mut links = self.links.write().await;
        if let Some(organization_id) = links.by_customer.remove(customer_id) {
            links.by_organization.remove(&organization_id);
        }
        Ok(())
    }

    async fn update_customer_id(
        &self,
        organization_id: &str,
        new_customer_id: &str,
    ) -> SyncResult<()> {
        let mut links = self.links.write().await;

        let old_customer_id = links
            .by_organization
            .get(organization_id)
            .cloned()
            .ok_or_else(|| {
                SyncError::CorrelationNotFound(format!("organization {}", organization_id))
            })?;

        if old_customer_id == new_customer_id {
            return Ok(());
        }
        if links.by_customer.contains_key(new_customer_id) {
            return Err(SyncError::DuplicateKey(format!(
                "customer {} already linked",
                new_customer_id
            )));
        }

        links.by_customer.remove(&old_customer_id);
        links
            .by_customer
            .insert(new_customer_id.to_string(), organization_id.to_string());
        links
            .by_organization
            .insert(organization_id.to_string(), new_customer_id.to_string());
        Ok(())
    }

    async fn update_organization_id(
        &self,
        customer_id: &str,
        new_organization_id: &str,
    ) -> SyncResult<()> {
        let mut links = self.links.write().await;

        let old_organization_id = links
            .by_customer
            .get(customer_id)
            .cloned()
            .ok_or_else(|| SyncError::CorrelationNotFound(format!("customer {}", customer_id)))?;

        if old_organization_id == new_organization_id {
            return Ok(());
        }
        if links.by_organization.contains_key(new_organization_id) {
            return Err(SyncError::DuplicateKey(format!(
                "organization {} already linked",
                new_organization_id
            )));
        }

        links.by_organization.remove(&old_organization_id);
        links
            .by_organization
            .insert(new_organization_id.to_string(), customer_id.to_string());
        links
            .by_customer
            .insert(customer_id.to_string(), new_organization_id.to_string());
        Ok(())
    }
}
