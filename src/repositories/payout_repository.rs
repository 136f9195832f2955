use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{PayoutAttempt, PayoutResolution};
use crate::repositories::ports::PayoutStore;

const COLUMNS: &str = "id, source_transaction_id, tenant_id, target_id, beneficiary_share, state, \
     external_reference, external_receipt, failure_reason, result_metadata, created_at, resolved_at";

pub struct PayoutRepository {
    pool: PgPool,
}

impl PayoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PayoutAttempt>> {
        let row = sqlx::query_as::<_, PayoutAttempt>(&format!("SELECT {COLUMNS} FROM payout_attempts WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }
}

#[async_trait]
impl PayoutStore for PayoutRepository {
    async fn reserve(&self, attempt: &PayoutAttempt) -> Result<Option<PayoutAttempt>> {
        let row = sqlx::query_as::<_, PayoutAttempt>(&format!(
            r#"
            INSERT INTO payout_attempts ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (source_transaction_id) DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(attempt.id)
        .bind(attempt.source_transaction_id)
        .bind(attempt.tenant_id)
        .bind(attempt.target_id)
        .bind(attempt.beneficiary_share)
        .bind(attempt.state)
        .bind(&attempt.external_reference)
        .bind(&attempt.external_receipt)
        .bind(&attempt.failure_reason)
        .bind(&attempt.result_metadata)
        .bind(attempt.created_at)
        .bind(attempt.resolved_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn attach_reference(&self, id: Uuid, reference: &str) -> Result<Option<PayoutAttempt>> {
        let row = sqlx::query_as::<_, PayoutAttempt>(&format!(
            r#"
            UPDATE payout_attempts
            SET external_reference = $2
            WHERE id = $1 AND external_reference IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn find_by_source(&self, source_transaction_id: Uuid) -> Result<Option<PayoutAttempt>> {
        let row = sqlx::query_as::<_, PayoutAttempt>(&format!(
            "SELECT {COLUMNS} FROM payout_attempts WHERE source_transaction_id = $1"
        ))
        .bind(source_transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<PayoutAttempt>> {
        let row = sqlx::query_as::<_, PayoutAttempt>(&format!(
            "SELECT {COLUMNS} FROM payout_attempts WHERE external_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn resolve(&self, id: Uuid, resolution: &PayoutResolution) -> Result<Option<PayoutAttempt>> {
        let (receipt, reason, metadata) = match resolution {
            PayoutResolution::Complete { receipt, metadata } => (receipt.as_deref(), None, Some(metadata)),
            PayoutResolution::Fail { reason, metadata } => (None, Some(reason.as_str()), metadata.as_ref()),
        };

        let row = sqlx::query_as::<_, PayoutAttempt>(&format!(
            r#"
            UPDATE payout_attempts
            SET state = $2,
                external_receipt = $3,
                failure_reason = $4,
                result_metadata = $5,
                resolved_at = NOW()
            WHERE id = $1 AND state = 'initiated'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(resolution.target_state())
        .bind(receipt)
        .bind(reason)
        .bind(metadata)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        if row.is_some() {
            return Ok(row);
        }

        match self.find_by_id(id).await? {
            Some(_) => Ok(None),
            None => Err(AppError::NotFound(format!("Payout attempt {} not found", id))),
        }
    }
}
