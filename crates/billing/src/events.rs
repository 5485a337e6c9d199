//! Inbound webhook events and their payload shapes

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::{SyncError, SyncResult};
use crate::metadata::{SubscriptionRecord, SubscriptionStatus};

/// A verified webhook delivery handed to the core by the transport.
///
/// `id` identifies the delivery: providers reuse it when they redeliver, so
/// it is the dedup key. `payload` is the event's data object.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub payload: Value,
    pub received_at: OffsetDateTime,
}

impl WebhookEvent {
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload,
            received_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_type(&self.event_type)
    }

    /// Decode the payload into the shape expected for this event type
    pub fn decode<T: DeserializeOwned>(&self) -> SyncResult<T> {
        T::deserialize(&self.payload).map_err(|e| {
            SyncError::MalformedPayload(format!("{} event {}: {}", self.event_type, self.id, e))
        })
    }
}

/// Event types the pipeline acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    OrganizationCreated,
    OrganizationUpdated,
    OrganizationDeleted,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    Unrecognized,
}

impl EventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "organization.created" => EventKind::OrganizationCreated,
            "organization.updated" => EventKind::OrganizationUpdated,
            "organization.deleted" => EventKind::OrganizationDeleted,
            "customer.subscription.created" => EventKind::SubscriptionCreated,
            "customer.subscription.updated" => EventKind::SubscriptionUpdated,
            "customer.subscription.deleted" => EventKind::SubscriptionDeleted,
            _ => EventKind::Unrecognized,
        }
    }
}

/// Identity-provider organization object
#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationPayload {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl OrganizationPayload {
    /// Name used for the billing customer, falling back to the organization id
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.id,
        }
    }
}

/// An id that the billing provider may send either bare or expanded
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExpandableId {
    Id(String),
    Object { id: String },
}

impl ExpandableId {
    pub fn id(&self) -> &str {
        match self {
            ExpandableId::Id(id) => id,
            ExpandableId::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemList {
    #[serde(default)]
    pub data: Vec<SubscriptionItemPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItemPayload {
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub price: Option<PricePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricePayload {
    pub id: String,
    #[serde(default)]
    pub product: Option<ExpandableId>,
}

/// Billing-provider subscription object
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionPayload {
    pub id: String,
    pub customer: ExpandableId,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// Present on older API versions; newer ones carry it per item
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: ItemList,
}

impl SubscriptionPayload {
    pub fn customer_id(&self) -> &str {
        self.customer.id()
    }

    /// Period end from the first item, then the subscription itself, else `0`.
    /// A zero period end never counts as active.
    pub fn current_period_end(&self) -> i64 {
        self.items
            .data
            .first()
            .and_then(|item| item.current_period_end)
            .or(self.current_period_end)
            .unwrap_or(0)
    }

    /// The record stored in organization metadata
    pub fn to_record(&self) -> SubscriptionRecord {
        let price = self.items.data.first().and_then(|item| item.price.as_ref());

        SubscriptionRecord {
            id: self.id.clone(),
            status: self.status.clone(),
            current_period_end: self.current_period_end(),
            product_id: price
                .and_then(|p| p.product.as_ref())
                .map(|product| product.id().to_string())
                .unwrap_or_default(),
            price_id: price.map(|p| p.id.clone()).unwrap_or_default(),
            cancel_at_period_end: self.cancel_at_period_end,
            extra: Default::default(),
        }
    }
}
