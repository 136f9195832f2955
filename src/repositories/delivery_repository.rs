use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{CallbackDelivery, CallbackKind, DeliveryOutcome};
use crate::repositories::ports::DeliveryLog;

/// Postgres-backed webhook audit log.
pub struct DeliveryRepository {
    pool: PgPool,
}

impl DeliveryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryLog for DeliveryRepository {
    async fn record(&self, delivery: &CallbackDelivery) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO callback_deliveries (id, kind, correlation_id, payload_hash, payload, outcome, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.kind)
        .bind(&delivery.correlation_id)
        .bind(&delivery.payload_hash)
        .bind(&delivery.payload)
        .bind(delivery.outcome)
        .bind(delivery.received_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    async fn parked_for(&self, kind: CallbackKind, correlation_id: &str) -> Result<Vec<CallbackDelivery>> {
        let rows = sqlx::query_as::<_, CallbackDelivery>(
            r#"
            SELECT id, kind, correlation_id, payload_hash, payload, outcome, received_at
            FROM callback_deliveries
            WHERE kind = $1 AND correlation_id = $2 AND outcome = $3
            ORDER BY received_at
            "#,
        )
        .bind(kind)
        .bind(correlation_id)
        .bind(DeliveryOutcome::Parked)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    async fn parked_correlation_ids(&self, kind: CallbackKind, limit: i64) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT correlation_id
            FROM callback_deliveries
            WHERE kind = $1 AND outcome = $2 AND correlation_id IS NOT NULL
            GROUP BY correlation_id
            ORDER BY MIN(received_at)
            LIMIT $3
            "#,
        )
        .bind(kind)
        .bind(DeliveryOutcome::Parked)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(ids)
    }

    async fn mark_replayed(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE callback_deliveries SET outcome = $2 WHERE id = $1 AND outcome = $3")
            .bind(id)
            .bind(DeliveryOutcome::Replayed)
            .bind(DeliveryOutcome::Parked)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
