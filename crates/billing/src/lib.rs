// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Orgsync Billing Core
//!
//! Keeps an identity provider's organizations and a billing provider's
//! customers and subscriptions in step, driven by webhooks from both.
//!
//! ## Features
//!
//! - **Deduplication**: Time-windowed claim cache for at-least-once deliveries
//! - **Correlation**: 1:1 organization ↔ customer table (in-memory or PostgreSQL)
//! - **Reconciliation**: Pure, idempotent edits of the organization metadata document
//! - **Pipeline**: Per-event state machine with per-organization write serialization
//! - **Dispatch**: Bounded worker pool with awaitable and broadcast outcomes
//! - **Access**: Read-side queries over active subscriptions

pub mod access;
pub mod clerk;
pub mod client;
pub mod correlation;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod metadata;
pub mod org_locks;
pub mod providers;
pub mod webhooks;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;


// Access
pub use access::SubscriptionAccess;

// Clients
pub use clerk::{ClerkClient, ClerkConfig};
pub use client::{StripeClient, StripeConfig};

// Correlation
pub use correlation::{
    CorrelationRecord, CorrelationStore, InMemoryCorrelationStore, PgCorrelationStore,
};

// Dedup
pub use dedup::{EventDedupCache, DEDUP_WINDOW, SWEEP_INTERVAL};

// Dispatch
pub use dispatch::{
    CompletedEvent, DispatchError, DispatcherConfig, PendingOutcome, WebhookDispatcher,
};

// Error
pub use error::{SyncError, SyncResult};

// Events
pub use events::{EventKind, WebhookEvent};

// Metadata
pub use metadata::{MetadataDocument, SubscriptionRecord, SubscriptionStatus};

// Providers
pub use providers::{BillingProvider, IdentityProvider};

// Webhooks
pub use webhooks::{ProcessingOutcome, WebhookHandler};
