//! PostgreSQL-backed correlation store

use async_trait::async_trait;
use sqlx::PgPool;

use super::{CorrelationRecord, CorrelationStore};
use crate::error::{SyncError, SyncResult};

/// Correlation rows in `organization_customer_links`.
///
/// Unique constraints on both columns enforce the 1:1 invariant; a violation
/// surfaces as `SyncError::DuplicateKey` through `From<sqlx::Error>`.
#[derive(Clone)]
pub struct PgCorrelationStore {
    pool: PgPool,
}

impl PgCorrelationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations
    pub async fn run_migrations(&self) -> SyncResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Correlation store migrations applied");
        Ok(())
    }
}

#[async_trait]
impl CorrelationStore for PgCorrelationStore {
    async fn create(
        &self,
        organization_id: &str,
        customer_id: &str,
    ) -> SyncResult<CorrelationRecord> {
        let record: CorrelationRecord = sqlx::query_as(
            r#"
            INSERT INTO organization_customer_links (organization_id, customer_id)
            VALUES ($1, $2)
            RETURNING organization_id, customer_id
            "#,
        )
        .bind(organization_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            organization_id = %organization_id,
            customer_id = %customer_id,
            "Created organization correlation"
        );

        Ok(record)
    }

    async fn get(&self, organization_id: &str) -> SyncResult<CorrelationRecord> {
        let record: Option<CorrelationRecord> = sqlx::query_as(
            r#"
            SELECT organization_id, customer_id
            FROM organization_customer_links
            WHERE organization_id = $1
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| {
            SyncError::CorrelationNotFound(format!("organization {}", organization_id))
        })
    }

    async fn get_by_customer_id(&self, customer_id: &str) -> SyncResult<String> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT organization_id FROM organization_customer_links WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(organization_id,)| organization_id)
            .ok_or_else(|| SyncError::CorrelationNotFound(format!("customer {}", customer_id)))
    }

    async fn delete_by_organization_id(&self, organization_id: &str) -> SyncResult<()> {
        sqlx::query("DELETE FROM organization_customer_links WHERE organization_id = $1")
            .bind(organization_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_customer_id(&self, customer_id: &str) -> SyncResult<()> {
        sqlx::query("DELETE FROM organization_customer_links WHERE customer_id = $1")
            .bind(customer_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_customer_id(
        &self,
        organization_id: &str,
        new_customer_id: &str,
    ) -> SyncResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE organization_customer_links
            SET customer_id = $2, updated_at = NOW()
            WHERE organization_id = $1
            "#,
        )
        .bind(organization_id)
        .bind(new_customer_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::CorrelationNotFound(format!(
                "organization {}",
                organization_id
            )));
        }

        tracing::info!(
            organization_id = %organization_id,
            customer_id = %new_customer_id,
            "Re-linked organization to new customer"
        );
        Ok(())
    }

    async fn update_organization_id(
        &self,
        customer_id: &str,
        new_organization_id: &str,
    ) -> SyncResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE organization_customer_links
            SET organization_id = $2, updated_at = NOW()
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .bind(new_organization_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::CorrelationNotFound(format!(
                "customer {}",
                customer_id
            )));
        }

        tracing::info!(
            customer_id = %customer_id,
            organization_id = %new_organization_id,
            "Re-linked customer to new organization"
        );
        Ok(())
    }
}
