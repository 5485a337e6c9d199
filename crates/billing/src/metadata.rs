//! Organization metadata reconciliation
//!
//! The identity provider stores subscription state for each organization in
//! a free-form public metadata document:
//!
//! ```json
//! { "stripe": { "subscriptions": [ { "id": "sub_1", "status": "active", ... } ] } }
//! ```
//!
//! Each entry of `stripe.subscriptions` keeps the JSON it was read from, so
//! entries an event does not target are written back byte for byte. Keys
//! outside that list, at the top level and inside `stripe`, are carried
//! through untouched so that other writers of the document are not clobbered.
//! Entries that do not decode as a subscription are kept as they are and
//! never count as active.
//!
//! The document can only be replaced as a whole, so every function here is a
//! pure transformation of a freshly fetched copy. All of them are idempotent
//! per subscription id, which is what makes webhook redelivery safe.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};

/// Billing provider subscription status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Unpaid,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Paused,
    /// Any other status, kept verbatim
    Other(String),
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for SubscriptionStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" => SubscriptionStatus::PastDue,
            "unpaid" => SubscriptionStatus::Unpaid,
            "canceled" => SubscriptionStatus::Canceled,
            "incomplete" => SubscriptionStatus::Incomplete,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "paused" => SubscriptionStatus::Paused,
            _ => SubscriptionStatus::Other(raw),
        }
    }
}

impl From<SubscriptionStatus> for String {
    fn from(status: SubscriptionStatus) -> Self {
        match status {
            SubscriptionStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of `stripe.subscriptions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: String,
    pub status: SubscriptionStatus,
    /// Epoch seconds; `0` when the billing payload carried no period end
    #[serde(default)]
    pub current_period_end: i64,
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub price_id: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// Keys written by someone else
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubscriptionRecord {
    /// Active iff status is `active` and the period has not ended.
    /// A period ending exactly at `now` is over.
    pub fn is_active(&self, now: i64) -> bool {
        self.status == SubscriptionStatus::Active && self.current_period_end > now
    }

    /// Fields this crate owns, written over an existing entry
    fn owned_fields(&self) -> [(&'static str, Value); 6] {
        [
            ("id", Value::from(self.id.as_str())),
            ("status", Value::from(self.status.as_str())),
            ("current_period_end", Value::from(self.current_period_end)),
            ("product_id", Value::from(self.product_id.as_str())),
            ("price_id", Value::from(self.price_id.as_str())),
            ("cancel_at_period_end", Value::from(self.cancel_at_period_end)),
        ]
    }
}

/// A stored entry: the JSON as read, plus its decoded form when it has one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct SubscriptionEntry {
    raw: Value,
    record: Option<SubscriptionRecord>,
}

impl From<Value> for SubscriptionEntry {
    fn from(raw: Value) -> Self {
        let record = SubscriptionRecord::deserialize(&raw).ok();
        Self { raw, record }
    }
}

impl From<SubscriptionEntry> for Value {
    fn from(entry: SubscriptionEntry) -> Self {
        entry.raw
    }
}

impl From<SubscriptionRecord> for SubscriptionEntry {
    fn from(record: SubscriptionRecord) -> Self {
        let mut object = record.extra.clone();
        object.extend(record.owned_fields().map(|(key, value)| (key.to_string(), value)));
        Self {
            raw: Value::Object(object),
            record: Some(record),
        }
    }
}

impl SubscriptionEntry {
    /// Decoded subscription; `None` for entries that are not one
    pub fn record(&self) -> Option<&SubscriptionRecord> {
        self.record.as_ref()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// The `id` key, read from the raw JSON so undecodable entries still match
    pub fn id(&self) -> Option<&str> {
        self.raw.get("id").and_then(Value::as_str)
    }

    /// Overwrite the owned fields, leaving every other key of the entry alone
    fn update(&mut self, record: SubscriptionRecord) {
        let Value::Object(object) = &mut self.raw else {
            *self = record.into();
            return;
        };

        for (key, value) in &record.extra {
            object.insert(key.clone(), value.clone());
        }
        for (key, value) in record.owned_fields() {
            object.insert(key.to_string(), value);
        }
        self.record = SubscriptionRecord::deserialize(&self.raw).ok();
    }
}

/// The `stripe` section of the metadata document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripeMetadata {
    #[serde(default, deserialize_with = "entries_or_empty")]
    pub subscriptions: Vec<SubscriptionEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An organization's public metadata document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(
        default,
        deserialize_with = "object_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub stripe: Option<StripeMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Older writers emitted `"subscriptions": null` after removing the last
/// entry. Anything that is not a list reads as empty and is replaced on the
/// next add.
fn entries_or_empty<'de, D>(deserializer: D) -> Result<Vec<SubscriptionEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().map(SubscriptionEntry::from).collect(),
        _ => Vec::new(),
    })
}

/// A `stripe` key that is not an object reads as absent
fn object_or_none<'de, D>(deserializer: D) -> Result<Option<StripeMetadata>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => StripeMetadata::deserialize(value).ok(),
        _ => None,
    })
}

impl MetadataDocument {
    /// Decode a metadata blob; JSON `null` is an empty document
    pub fn from_value(value: Value) -> SyncResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|e| SyncError::MalformedMetadata(e.to_string()))
    }

    pub fn to_value(&self) -> SyncResult<Value> {
        serde_json::to_value(self).map_err(|e| SyncError::MalformedMetadata(e.to_string()))
    }

    /// Every stored entry, decodable or not, in stored order
    pub fn entries(&self) -> &[SubscriptionEntry] {
        self.stripe
            .as_ref()
            .map(|stripe| stripe.subscriptions.as_slice())
            .unwrap_or_default()
    }

    /// Decoded subscriptions in stored order, empty when the `stripe` section is absent
    pub fn subscriptions(&self) -> Vec<&SubscriptionRecord> {
        self.entries()
            .iter()
            .filter_map(SubscriptionEntry::record)
            .collect()
    }

    pub fn subscription(&self, subscription_id: &str) -> Option<&SubscriptionRecord> {
        self.entries()
            .iter()
            .filter_map(SubscriptionEntry::record)
            .find(|s| s.id == subscription_id)
    }
}

/// Insert the subscription, or update the entry with the same id in place.
///
/// Initializes the `stripe` section and its list when missing. Keys of the
/// matched entry that this crate does not own are kept. Any further entries
/// sharing the id are dropped so the list keeps one entry per id.
pub fn add_or_update_subscription(
    mut doc: MetadataDocument,
    subscription: SubscriptionRecord,
) -> MetadataDocument {
    let stripe = doc.stripe.get_or_insert_with(StripeMetadata::default);
    let entries = &mut stripe.subscriptions;
    let id = subscription.id.clone();

    match entries.iter().position(|e| e.id() == Some(id.as_str())) {
        Some(index) => {
            entries[index].update(subscription);

            let mut seen = false;
            entries.retain(|e| {
                if e.id() != Some(id.as_str()) {
                    return true;
                }
                let keep = !seen;
                seen = true;
                keep
            });
        }
        None => entries.push(subscription.into()),
    }

    doc
}

/// Drop every entry with the given id. No-op when absent.
pub fn remove_subscription(mut doc: MetadataDocument, subscription_id: &str) -> MetadataDocument {
    if let Some(stripe) = doc.stripe.as_mut() {
        stripe
            .subscriptions
            .retain(|e| e.id() != Some(subscription_id));
    }
    doc
}

/// Active entries in stored order
pub fn list_active_subscriptions(doc: &MetadataDocument, now: i64) -> Vec<&SubscriptionRecord> {
    doc.subscriptions()
        .into_iter()
        .filter(|s| s.is_active(now))
        .collect()
}

/// First active entry for a product, if any
pub fn active_subscription_for_product<'a>(
    doc: &'a MetadataDocument,
    product_id: &str,
    now: i64,
) -> Option<&'a SubscriptionRecord> {
    doc.subscriptions()
        .into_iter()
        .find(|s| s.product_id == product_id && s.is_active(now))
}

pub fn has_active_subscription_for_product(
    doc: &MetadataDocument,
    product_id: &str,
    now: i64,
) -> bool {
    active_subscription_for_product(doc, product_id, now).is_some()
}

/// Product ids with at least one active subscription, first occurrence order
pub fn active_product_ids(doc: &MetadataDocument, now: i64) -> Vec<&str> {
    let mut products: Vec<&str> = Vec::new();
    for subscription in list_active_subscriptions(doc, now) {
        let product_id = subscription.product_id.as_str();
        if !product_id.is_empty() && !products.contains(&product_id) {
            products.push(product_id);
        }
    }
    products
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_750_000_000;

    fn sub(id: &str, status: SubscriptionStatus, period_end: i64, product: &str) -> SubscriptionRecord {
        SubscriptionRecord {
            id: id.to_string(),
            status,
            current_period_end: period_end,
            product_id: product.to_string(),
            price_id: format!("price_{}", product),
            cancel_at_period_end: false,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_add_to_empty_document() {
        let input = SubscriptionRecord {
            id: "sub_1".to_string(),
            status: SubscriptionStatus::Active,
            current_period_end: NOW + 3600,
            product_id: "prod_A".to_string(),
            price_id: "price_A".to_string(),
            cancel_at_period_end: false,
            extra: Map::new(),
        };

        let doc = add_or_update_subscription(MetadataDocument::default(), input.clone());

        assert_eq!(doc.subscriptions(), vec![&input]);
    }

    #[test]
    fn test_add_or_update_is_idempotent() {
        let base = MetadataDocument::from_value(json!({
            "plan": "legacy",
            "stripe": { "subscriptions": [ { "id": "sub_0", "status": "canceled", "current_period_end": 1 } ] }
        }))
        .unwrap();
        let s = sub("sub_1", SubscriptionStatus::Active, NOW + 10, "prod_A");

        let once = add_or_update_subscription(base.clone(), s.clone());
        let twice = add_or_update_subscription(once.clone(), s);

        assert_eq!(once, twice);
        assert_eq!(twice.subscriptions().len(), 2);
    }

    #[test]
    fn test_update_overwrites_in_place_preserving_order() {
        let doc = MetadataDocument::default();
        let doc = add_or_update_subscription(doc, sub("sub_1", SubscriptionStatus::Active, NOW + 10, "prod_A"));
        let doc = add_or_update_subscription(doc, sub("sub_2", SubscriptionStatus::Active, NOW + 10, "prod_B"));

        let doc = add_or_update_subscription(doc, sub("sub_1", SubscriptionStatus::PastDue, NOW + 99, "prod_C"));

        let ids: Vec<&str> = doc.subscriptions().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sub_1", "sub_2"]);
        assert_eq!(doc.subscriptions()[0].status, SubscriptionStatus::PastDue);
        assert_eq!(doc.subscriptions()[0].current_period_end, NOW + 99);
        assert_eq!(doc.subscriptions()[0].product_id, "prod_C");
    }

    #[test]
    fn test_update_collapses_preexisting_duplicates() {
        let doc = MetadataDocument::from_value(json!({
            "stripe": { "subscriptions": [
                { "id": "sub_1", "status": "active", "current_period_end": 5 },
                { "id": "sub_2", "status": "active", "current_period_end": 5 },
                { "id": "sub_1", "status": "canceled", "current_period_end": 5 }
            ] }
        }))
        .unwrap();

        let doc = add_or_update_subscription(doc, sub("sub_1", SubscriptionStatus::Active, NOW + 1, "prod_A"));

        let ids: Vec<&str> = doc.subscriptions().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sub_1", "sub_2"]);
    }

    #[test]
    fn test_unrelated_keys_survive_round_trip() {
        let original = json!({
            "onboarding": { "step": 3 },
            "stripe": {
                "customer_portal": "https://billing.example.com",
                "subscriptions": []
            }
        });

        let doc = MetadataDocument::from_value(original).unwrap();
        let doc = add_or_update_subscription(doc, sub("sub_1", SubscriptionStatus::Active, NOW + 1, "prod_A"));
        let value = doc.to_value().unwrap();

        assert_eq!(value["onboarding"]["step"], 3);
        assert_eq!(value["stripe"]["customer_portal"], "https://billing.example.com");
        assert_eq!(value["stripe"]["subscriptions"][0]["id"], "sub_1");
        assert_eq!(value["stripe"]["subscriptions"][0]["status"], "active");
    }

    #[test]
    fn test_remove_is_absorbing() {
        let doc = MetadataDocument::default();
        let doc = add_or_update_subscription(doc, sub("sub_1", SubscriptionStatus::Active, NOW + 10, "prod_A"));
        let doc = add_or_update_subscription(doc, sub("sub_2", SubscriptionStatus::Active, NOW + 10, "prod_B"));

        let once = remove_subscription(doc, "sub_1");
        let twice = remove_subscription(once.clone(), "sub_1");

        assert_eq!(once, twice);
        assert_eq!(twice.subscriptions().len(), 1);
        assert_eq!(twice.subscriptions()[0].id, "sub_2");
    }

    #[test]
    fn test_remove_unknown_id_is_noop() {
        let doc = MetadataDocument::from_value(json!({ "theme": "dark" })).unwrap();
        let after = remove_subscription(doc.clone(), "sub_never_seen");

        assert_eq!(doc, after);
        assert!(after.stripe.is_none(), "Removal must not initialize the stripe section");
    }

    #[test]
    fn test_null_subscriptions_read_as_empty() {
        let doc = MetadataDocument::from_value(json!({ "stripe": { "subscriptions": null } })).unwrap();
        assert!(doc.subscriptions().is_empty());

        let doc = MetadataDocument::from_value(Value::Null).unwrap();
        assert_eq!(doc, MetadataDocument::default());
    }

    #[test]
    fn test_untargeted_entry_written_back_unchanged() {
        let other = json!({
            "id": "sub_other",
            "status": "on_hold",
            "current_period_end": 9,
            "seats": 5
        });
        let doc = MetadataDocument::from_value(json!({
            "stripe": { "subscriptions": [ other.clone() ] }
        }))
        .unwrap();

        let doc = add_or_update_subscription(doc, sub("sub_new", SubscriptionStatus::Active, NOW + 1, "prod_A"));
        let doc = remove_subscription(doc, "sub_gone");
        let value = doc.to_value().unwrap();

        assert_eq!(value["stripe"]["subscriptions"][0], other);
        assert_eq!(value["stripe"]["subscriptions"][1]["id"], "sub_new");
    }

    #[test]
    fn test_update_keeps_foreign_keys_of_matched_entry() {
        let doc = MetadataDocument::from_value(json!({
            "stripe": { "subscriptions": [ {
                "id": "sub_1",
                "status": "trialing",
                "current_period_end": 5,
                "seats": 5
            } ] }
        }))
        .unwrap();

        let doc = add_or_update_subscription(doc, sub("sub_1", SubscriptionStatus::Active, NOW + 1, "prod_A"));
        let value = doc.to_value().unwrap();
        let entry = &value["stripe"]["subscriptions"][0];

        assert_eq!(entry["seats"], 5);
        assert_eq!(entry["status"], "active");
        assert_eq!(entry["current_period_end"], NOW + 1);
        assert_eq!(doc.subscriptions()[0].extra.get("seats"), Some(&json!(5)));
    }

    #[test]
    fn test_undecodable_entries_carried_through() {
        let doc = MetadataDocument::from_value(json!({
            "stripe": { "subscriptions": [
                "legacy-string-entry",
                { "status": "active" },
                { "id": "sub_float", "status": "active", "current_period_end": 1.5e12 },
                { "id": "sub_1", "status": "active", "current_period_end": NOW + 10, "product_id": "prod_A" }
            ] }
        }))
        .unwrap();

        assert_eq!(doc.entries().len(), 4);
        let active: Vec<&str> = list_active_subscriptions(&doc, NOW)
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(active, vec!["sub_1"]);

        let doc = remove_subscription(doc, "sub_1");
        let value = doc.to_value().unwrap();
        assert_eq!(value["stripe"]["subscriptions"][0], "legacy-string-entry");
        assert_eq!(value["stripe"]["subscriptions"][1], json!({ "status": "active" }));
        assert_eq!(value["stripe"]["subscriptions"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_undecodable_entry_repaired_by_matching_event() {
        let doc = MetadataDocument::from_value(json!({
            "stripe": { "subscriptions": [
                { "id": "sub_1", "status": "active", "current_period_end": 1.5e12, "seats": 2 }
            ] }
        }))
        .unwrap();
        assert!(doc.subscription("sub_1").is_none());

        let doc = add_or_update_subscription(doc, sub("sub_1", SubscriptionStatus::Active, NOW + 10, "prod_A"));

        assert_eq!(doc.entries().len(), 1);
        let repaired = doc.subscription("sub_1").unwrap();
        assert_eq!(repaired.current_period_end, NOW + 10);
        assert_eq!(repaired.extra.get("seats"), Some(&json!(2)));
    }

    #[test]
    fn test_non_object_stripe_section_reads_as_absent() {
        let doc = MetadataDocument::from_value(json!({ "stripe": "legacy", "theme": "dark" })).unwrap();
        assert!(doc.stripe.is_none());
        assert!(doc.subscriptions().is_empty());

        let doc = MetadataDocument::from_value(json!({ "stripe": { "subscriptions": "nope" } })).unwrap();
        assert!(doc.entries().is_empty());
    }

    #[test]
    fn test_unknown_status_kept_verbatim() {
        let doc = MetadataDocument::from_value(json!({
            "stripe": { "subscriptions": [ { "id": "sub_1", "status": "on_hold", "current_period_end": 9 } ] }
        }))
        .unwrap();

        assert_eq!(
            doc.subscriptions()[0].status,
            SubscriptionStatus::Other("on_hold".to_string())
        );
        assert_eq!(doc.to_value().unwrap()["stripe"]["subscriptions"][0]["status"], "on_hold");
    }

    #[test]
    fn test_active_filter_boundaries() {
        let doc = MetadataDocument::default();
        let doc = add_or_update_subscription(doc, sub("sub_future", SubscriptionStatus::Active, NOW + 1, "prod_A"));
        let doc = add_or_update_subscription(doc, sub("sub_now", SubscriptionStatus::Active, NOW, "prod_A"));
        let doc = add_or_update_subscription(doc, sub("sub_past", SubscriptionStatus::Active, NOW - 1, "prod_A"));
        let doc = add_or_update_subscription(doc, sub("sub_trial", SubscriptionStatus::Trialing, NOW + 100, "prod_B"));
        let doc = add_or_update_subscription(doc, sub("sub_zero", SubscriptionStatus::Active, 0, "prod_C"));

        let active: Vec<&str> = list_active_subscriptions(&doc, NOW)
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(active, vec!["sub_future"]);
    }

    #[test]
    fn test_active_listing_keeps_insertion_order() {
        let doc = MetadataDocument::default();
        let doc = add_or_update_subscription(doc, sub("sub_b", SubscriptionStatus::Active, NOW + 5, "prod_B"));
        let doc = add_or_update_subscription(doc, sub("sub_a", SubscriptionStatus::Active, NOW + 500, "prod_A"));

        let active: Vec<&str> = list_active_subscriptions(&doc, NOW)
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(active, vec!["sub_b", "sub_a"]);
    }

    #[test]
    fn test_has_active_subscription_for_product() {
        let doc = MetadataDocument::default();
        let doc = add_or_update_subscription(doc, sub("sub_1", SubscriptionStatus::Canceled, NOW + 10, "prod_A"));
        let doc = add_or_update_subscription(doc, sub("sub_2", SubscriptionStatus::Active, NOW + 10, "prod_B"));

        assert!(!has_active_subscription_for_product(&doc, "prod_A", NOW));
        assert!(has_active_subscription_for_product(&doc, "prod_B", NOW));
        assert!(!has_active_subscription_for_product(&doc, "prod_B", NOW + 10));
        assert!(!has_active_subscription_for_product(&doc, "prod_missing", NOW));
    }

    #[test]
    fn test_active_product_ids_deduplicated() {
        let doc = MetadataDocument::default();
        let doc = add_or_update_subscription(doc, sub("sub_1", SubscriptionStatus::Active, NOW + 10, "prod_A"));
        let doc = add_or_update_subscription(doc, sub("sub_2", SubscriptionStatus::Active, NOW + 10, "prod_A"));
        let doc = add_or_update_subscription(doc, sub("sub_3", SubscriptionStatus::Active, NOW + 10, "prod_B"));

        assert_eq!(active_product_ids(&doc, NOW), vec!["prod_A", "prod_B"]);
        assert_eq!(
            active_subscription_for_product(&doc, "prod_A", NOW).map(|s| s.id.as_str()),
            Some("sub_1")
        );
    }
}
