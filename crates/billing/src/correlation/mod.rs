//! Organization ↔ billing customer correlation
//!
//! Billing webhooks only carry the customer id and identity webhooks only
//! carry the organization id. This table is the single source of truth
//! joining the two, kept strictly 1:1.

mod memory;
mod postgres;

pub use memory::InMemoryCorrelationStore;
pub use postgres::PgCorrelationStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

/// A single organization ↔ customer link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CorrelationRecord {
    pub organization_id: String,
    pub customer_id: String,
}

/// Storage for correlation records.
///
/// Implementations must keep both columns unique and make each single-row
/// create/update/delete atomic.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Insert a new link. Fails with `DuplicateKey` if either id is already linked.
    async fn create(&self, organization_id: &str, customer_id: &str)
        -> SyncResult<CorrelationRecord>;

    /// Full record for an organization, `CorrelationNotFound` if unlinked
    async fn get(&self, organization_id: &str) -> SyncResult<CorrelationRecord>;

    /// Customer id linked to an organization
    async fn get_by_organization_id(&self, organization_id: &str) -> SyncResult<String> {
        Ok(self.get(organization_id).await?.customer_id)
    }

    /// Organization id linked to a customer, `CorrelationNotFound` if unlinked
    async fn get_by_customer_id(&self, customer_id: &str) -> SyncResult<String>;

    /// Idempotent: succeeds when no row exists
    async fn delete_by_organization_id(&self, organization_id: &str) -> SyncResult<()>;

    /// Idempotent: succeeds when no row exists
    async fn delete_by_customer_id(&self, customer_id: &str) -> SyncResult<()>;

    /// Repoint an organization at a different customer
    async fn update_customer_id(&self, organization_id: &str, new_customer_id: &str)
        -> SyncResult<()>;

    /// Repoint a customer at a different organization
    async fn update_organization_id(
        &self,
        customer_id: &str,
        new_organization_id: &str,
    ) -> SyncResult<()>;
}
