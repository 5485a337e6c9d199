//! Remote collaborators the pipeline calls out to

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::metadata::MetadataDocument;

/// Owner of the per-organization metadata document.
///
/// There is no partial-update primitive: callers fetch the whole document,
/// change it, and write the whole document back.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn fetch_organization_metadata(&self, organization_id: &str)
        -> SyncResult<MetadataDocument>;

    async fn write_organization_metadata(
        &self,
        organization_id: &str,
        doc: &MetadataDocument,
    ) -> SyncResult<()>;
}

/// Owner of customer accounts
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a customer for an organization and return its id
    async fn create_customer_account(&self, name: &str, organization_id: &str)
        -> SyncResult<String>;

    /// Delete a customer. Deleting one that no longer exists succeeds.
    async fn delete_customer_account(&self, customer_id: &str) -> SyncResult<()>;
}
