//! Stripe client wrapper

use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{Client, CreateCustomer, Customer, CustomerId, StripeError};

use crate::error::{SyncError, SyncResult};
use crate::providers::BillingProvider;

const PROVIDER: &str = "stripe";

/// Stripe configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

/// Customer operations against the Stripe API
#[derive(Clone)]
pub struct StripeClient {
    inner: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = Client::new(config.secret_key.clone());
        Self { inner, config }
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_customer_account(
        &self,
        name: &str,
        organization_id: &str,
    ) -> SyncResult<String> {
        let mut params = CreateCustomer::new();
        params.name = Some(name);
        params.metadata = Some(HashMap::from([(
            "organization_id".to_string(),
            organization_id.to_string(),
        )]));

        let customer = Customer::create(&self.inner, params)
            .await
            .map_err(|e| SyncError::remote(PROVIDER, format!("create customer: {}", e)))?;

        tracing::info!(
            customer_id = %customer.id,
            organization_id = %organization_id,
            "Created Stripe customer"
        );

        Ok(customer.id.to_string())
    }

    async fn delete_customer_account(&self, customer_id: &str) -> SyncResult<()> {
        let id: CustomerId = customer_id.parse().map_err(|_| {
            SyncError::MalformedPayload(format!("invalid customer id {}", customer_id))
        })?;

        match Customer::delete(&self.inner, &id).await {
            Ok(_) => {
                tracing::info!(customer_id = %customer_id, "Deleted Stripe customer");
                Ok(())
            }
            Err(StripeError::Stripe(request_error)) if request_error.http_status == 404 => {
                tracing::warn!(
                    customer_id = %customer_id,
                    "Stripe customer already deleted"
                );
                Ok(())
            }
            Err(e) => Err(SyncError::remote(
                PROVIDER,
                format!("delete customer {}: {}", customer_id, e),
            )),
        }
    }
}
