//! Application state

use std::sync::Arc;

use orgsync_billing::{EventDedupCache, SubscriptionAccess, WebhookDispatcher};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Same cache the webhook handler claims against; exposed for health stats
    pub dedup: Arc<EventDedupCache>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub access: SubscriptionAccess,
}

impl AppState {
    pub fn new(
        config: Config,
        dedup: Arc<EventDedupCache>,
        dispatcher: Arc<WebhookDispatcher>,
        access: SubscriptionAccess,
    ) -> Self {
        Self {
            config: Arc::new(config),
            dedup,
            dispatcher,
            access,
        }
    }
}
