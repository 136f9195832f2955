use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Appliance, DisbursementTarget, Plan, Tenant};
use crate::repositories::ports::CatalogStore;

/// Read-only access to plans, appliances, tenants and their payout targets.
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for CatalogRepository {
    async fn find_plan(&self, id: Uuid) -> Result<Option<Plan>> {
        let row = sqlx::query_as::<_, Plan>(
            r#"
            SELECT id, name, price, duration_hours, speed_mbps, is_active, created_at
            FROM plans
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn active_plans(&self) -> Result<Vec<Plan>> {
        let rows = sqlx::query_as::<_, Plan>(
            r#"
            SELECT id, name, price, duration_hours, speed_mbps, is_active, created_at
            FROM plans
            WHERE is_active = TRUE
            ORDER BY price, duration_hours
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    async fn find_appliance(&self, id: Uuid) -> Result<Option<Appliance>> {
        let row = sqlx::query_as::<_, Appliance>(
            r#"
            SELECT id, tenant_id, name, base_url, username, password, is_active, created_at
            FROM appliances
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn find_tenant(&self, id: Uuid) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, Tenant>(
            "SELECT id, name, share_percent, created_at FROM tenants WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn disbursement_targets(&self, tenant_id: Uuid) -> Result<Vec<DisbursementTarget>> {
        let rows = sqlx::query_as::<_, DisbursementTarget>(
            r#"
            SELECT id, tenant_id, appliance_id, paybill, account_reference, is_active, created_at
            FROM disbursement_targets
            WHERE tenant_id = $1 AND is_active = TRUE
            ORDER BY created_at
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
