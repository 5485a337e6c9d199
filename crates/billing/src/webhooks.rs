//! Webhook ingestion pipeline
//!
//! Every verified event goes through the same steps: claim the event id in
//! the dedup cache, dispatch on the event type, and turn the result into a
//! [`ProcessingOutcome`] for the transport to acknowledge.
//!
//! Organization events keep the correlation table and billing customers in
//! step with the identity provider. Subscription events are folded into the
//! owning organization's metadata document under a per-organization lock.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::correlation::CorrelationStore;
use crate::dedup::EventDedupCache;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventKind, OrganizationPayload, SubscriptionPayload, WebhookEvent};
use crate::metadata::{add_or_update_subscription, remove_subscription, MetadataDocument};
use crate::org_locks::OrganizationLocks;
use crate::providers::{BillingProvider, IdentityProvider};

/// Terminal state of one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Processed,
    /// Duplicate delivery within the dedup window
    Skipped,
    Failed(SyncError),
}

impl ProcessingOutcome {
    /// Whether the delivery should be acknowledged to the provider
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, ProcessingOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProcessingOutcome::Processed => "processed",
            ProcessingOutcome::Skipped => "skipped",
            ProcessingOutcome::Failed(_) => "failed",
        }
    }
}

/// Webhook handler for identity and billing events
pub struct WebhookHandler {
    dedup: Arc<EventDedupCache>,
    correlations: Arc<dyn CorrelationStore>,
    identity: Arc<dyn IdentityProvider>,
    billing: Arc<dyn BillingProvider>,
    org_locks: OrganizationLocks,
}

impl WebhookHandler {
    pub fn new(
        dedup: Arc<EventDedupCache>,
        correlations: Arc<dyn CorrelationStore>,
        identity: Arc<dyn IdentityProvider>,
        billing: Arc<dyn BillingProvider>,
    ) -> Self {
        Self {
            dedup,
            correlations,
            identity,
            billing,
            org_locks: OrganizationLocks::new(),
        }
    }

    pub fn dedup(&self) -> &Arc<EventDedupCache> {
        &self.dedup
    }

    /// Handle a verified event.
    ///
    /// Never returns an error: every failure is converted into
    /// `ProcessingOutcome::Failed`. A failed event gives up its dedup claim
    /// so the provider's redelivery is processed instead of skipped.
    pub async fn handle_event(&self, event: WebhookEvent) -> ProcessingOutcome {
        match self.claim_and_process(&event).await {
            Ok(()) => {
                tracing::debug!(event_id = %event.id, "Webhook event processed");
                ProcessingOutcome::Processed
            }
            Err(SyncError::DuplicateDelivery(_)) => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Duplicate webhook event - already claimed within dedup window"
                );
                ProcessingOutcome::Skipped
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error_kind = e.kind(),
                    error = %e,
                    "Webhook event processing failed"
                );
                self.dedup.release(&event.id).await;
                ProcessingOutcome::Failed(e)
            }
        }
    }

    /// Claim the event id, then process. A lost claim is `DuplicateDelivery`.
    async fn claim_and_process(&self, event: &WebhookEvent) -> SyncResult<()> {
        if !self.dedup.claim(&event.id).await {
            return Err(SyncError::DuplicateDelivery(event.id.clone()));
        }

        tracing::info!(
            event_type = %event.event_type,
            event_id = %event.id,
            "Processing webhook event (claimed exclusive processing rights)"
        );

        self.process_event_internal(event).await
    }

    /// Internal event processing logic
    async fn process_event_internal(&self, event: &WebhookEvent) -> SyncResult<()> {
        match event.kind() {
            // Organization events
            EventKind::OrganizationCreated => {
                self.handle_organization_created(event).await?;
            }
            EventKind::OrganizationUpdated => {
                tracing::debug!(
                    event_id = %event.id,
                    "Organization updated - nothing to synchronize"
                );
            }
            EventKind::OrganizationDeleted => {
                self.handle_organization_deleted(event).await?;
            }

            // Subscription events
            EventKind::SubscriptionCreated | EventKind::SubscriptionUpdated => {
                self.handle_subscription_upserted(event).await?;
            }
            EventKind::SubscriptionDeleted => {
                self.handle_subscription_deleted(event).await?;
            }

            EventKind::Unrecognized => {
                // Info level so new provider event types show up in the logs
                tracing::info!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    "Received unhandled webhook event type - no handler configured"
                );
            }
        }

        Ok(())
    }

    async fn handle_organization_created(&self, event: &WebhookEvent) -> SyncResult<()> {
        let organization: OrganizationPayload = event.decode()?;
        let _guard = self.org_locks.acquire(&organization.id).await;

        // Redelivery after the dedup window must not create a second customer
        match self.correlations.get(&organization.id).await {
            Ok(existing) => {
                tracing::info!(
                    organization_id = %organization.id,
                    customer_id = %existing.customer_id,
                    "Organization already linked to a customer - skipping creation"
                );
                return Ok(());
            }
            Err(SyncError::CorrelationNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let customer_id = self
            .billing
            .create_customer_account(organization.display_name(), &organization.id)
            .await?;

        if let Err(e) = self.correlations.create(&organization.id, &customer_id).await {
            tracing::error!(
                organization_id = %organization.id,
                customer_id = %customer_id,
                error = %e,
                "Created customer but failed to store correlation - customer is orphaned"
            );
            return Err(e);
        }

        tracing::info!(
            organization_id = %organization.id,
            customer_id = %customer_id,
            "Linked new organization to billing customer"
        );
        Ok(())
    }

    async fn handle_organization_deleted(&self, event: &WebhookEvent) -> SyncResult<()> {
        let organization: OrganizationPayload = event.decode()?;
        let _guard = self.org_locks.acquire(&organization.id).await;

        let customer_id = match self
            .correlations
            .get_by_organization_id(&organization.id)
            .await
        {
            Ok(customer_id) => customer_id,
            Err(SyncError::CorrelationNotFound(_)) => {
                tracing::info!(
                    organization_id = %organization.id,
                    "Deleted organization has no linked customer - nothing to remove"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.billing.delete_customer_account(&customer_id).await?;
        self.correlations
            .delete_by_organization_id(&organization.id)
            .await?;

        tracing::info!(
            organization_id = %organization.id,
            customer_id = %customer_id,
            "Removed billing customer for deleted organization"
        );
        Ok(())
    }

    async fn handle_subscription_upserted(&self, event: &WebhookEvent) -> SyncResult<()> {
        let subscription = self.extract_subscription(event)?;
        let organization_id = self.get_org_id_from_customer(&subscription).await?;
        let record = subscription.to_record();

        tracing::info!(
            organization_id = %organization_id,
            subscription_id = %record.id,
            status = %record.status,
            product_id = %record.product_id,
            "Syncing subscription to organization metadata"
        );

        self.update_metadata(&organization_id, |doc| add_or_update_subscription(doc, record))
            .await
    }

    async fn handle_subscription_deleted(&self, event: &WebhookEvent) -> SyncResult<()> {
        let subscription = self.extract_subscription(event)?;
        let organization_id = self.get_org_id_from_customer(&subscription).await?;
        let subscription_id = subscription.id;

        tracing::info!(
            organization_id = %organization_id,
            subscription_id = %subscription_id,
            "Removing subscription from organization metadata"
        );

        self.update_metadata(&organization_id, |doc| {
            remove_subscription(doc, &subscription_id)
        })
        .await
    }

    /// Fetch, reconcile and write back one organization's metadata while
    /// holding that organization's lock. Skips the write when nothing changed.
    async fn update_metadata<F>(&self, organization_id: &str, reconcile: F) -> SyncResult<()>
    where
        F: FnOnce(MetadataDocument) -> MetadataDocument + Send,
    {
        let _guard = self.org_locks.acquire(organization_id).await;

        let current = self
            .identity
            .fetch_organization_metadata(organization_id)
            .await?;
        let next = reconcile(current.clone());

        if next == current {
            tracing::debug!(
                organization_id = %organization_id,
                "Organization metadata already up to date"
            );
            return Ok(());
        }

        self.identity
            .write_organization_metadata(organization_id, &next)
            .await
    }

    fn extract_subscription(&self, event: &WebhookEvent) -> SyncResult<SubscriptionPayload> {
        event.decode()
    }

    async fn get_org_id_from_customer(
        &self,
        subscription: &SubscriptionPayload,
    ) -> SyncResult<String> {
        let customer_id = subscription.customer_id();
        self.correlations
            .get_by_customer_id(customer_id)
            .await
            .map_err(|e| {
                tracing::warn!(
                    customer_id = %customer_id,
                    subscription_id = %subscription.id,
                    error = %e,
                    "Could not resolve organization for subscription"
                );
                e
            })
    }
}

/// Current time in epoch seconds, the clock used for "active" checks
pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
