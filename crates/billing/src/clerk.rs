//! Clerk organization metadata client

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{SyncError, SyncResult};
use crate::metadata::MetadataDocument;
use crate::providers::IdentityProvider;

const PROVIDER: &str = "clerk";

pub const DEFAULT_CLERK_API_URL: &str = "https://api.clerk.com/v1";

#[derive(Debug, Clone)]
pub struct ClerkConfig {
    pub secret_key: String,
    /// Svix signing secret, `whsec_` followed by base64
    pub webhook_secret: String,
    pub api_url: String,
}

#[derive(Debug, Deserialize)]
struct OrganizationResponse {
    #[serde(default)]
    public_metadata: Value,
}

/// Reads and replaces organization `public_metadata` through the Backend API
#[derive(Clone)]
pub struct ClerkClient {
    http: reqwest::Client,
    config: ClerkConfig,
}

impl ClerkClient {
    pub fn new(config: ClerkConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClerkConfig {
        &self.config
    }

    fn organization_url(&self, organization_id: &str) -> String {
        format!(
            "{}/organizations/{}",
            self.config.api_url.trim_end_matches('/'),
            organization_id
        )
    }

    async fn check_status(
        response: reqwest::Response,
        organization_id: &str,
    ) -> SyncResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match status {
            StatusCode::NOT_FOUND => format!("organization {} not found", organization_id),
            _ => format!("organization {}: {} {}", organization_id, status, body),
        };
        Err(SyncError::remote(PROVIDER, message))
    }
}

#[async_trait]
impl IdentityProvider for ClerkClient {
    async fn fetch_organization_metadata(
        &self,
        organization_id: &str,
    ) -> SyncResult<MetadataDocument> {
        let response = self
            .http
            .get(self.organization_url(organization_id))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| SyncError::remote(PROVIDER, e.to_string()))?;

        let organization: OrganizationResponse = Self::check_status(response, organization_id)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::remote(PROVIDER, format!("decode organization: {}", e)))?;

        MetadataDocument::from_value(organization.public_metadata)
    }

    async fn write_organization_metadata(
        &self,
        organization_id: &str,
        doc: &MetadataDocument,
    ) -> SyncResult<()> {
        let body = json!({ "public_metadata": doc.to_value()? });

        let response = self
            .http
            .patch(self.organization_url(organization_id))
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::remote(PROVIDER, e.to_string()))?;

        Self::check_status(response, organization_id).await?;

        tracing::debug!(
            organization_id = %organization_id,
            subscriptions = doc.subscriptions().len(),
            "Wrote organization metadata"
        );
        Ok(())
    }
}
