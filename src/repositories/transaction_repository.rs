use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{PaymentTransaction, Resolution, TransactionState};
use crate::repositories::ports::TransactionLedger;

const COLUMNS: &str = "id, correlation_id, merchant_request_id, subject_id, plan_id, phone, amount, state, \
     external_receipt, failure_reason, result_metadata, created_at, resolved_at";

/// Postgres-backed transaction ledger.
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionLedger for TransactionRepository {
    async fn create(&self, transaction: &PaymentTransaction) -> Result<PaymentTransaction> {
        let row = sqlx::query_as::<_, PaymentTransaction>(&format!(
            r#"
            INSERT INTO payment_transactions ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(transaction.id)
        .bind(&transaction.correlation_id)
        .bind(&transaction.merchant_request_id)
        .bind(transaction.subject_id)
        .bind(transaction.plan_id)
        .bind(&transaction.phone)
        .bind(transaction.amount)
        .bind(TransactionState::Pending)
        .bind(&transaction.external_receipt)
        .bind(&transaction.failure_reason)
        .bind(&transaction.result_metadata)
        .bind(transaction.created_at)
        .bind(transaction.resolved_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {COLUMNS} FROM payment_transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {COLUMNS} FROM payment_transactions WHERE correlation_id = $1"
        ))
        .bind(correlation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn try_transition(
        &self,
        correlation_id: &str,
        resolution: &Resolution,
    ) -> Result<Option<PaymentTransaction>> {
        let (receipt, reason, metadata) = match resolution {
            Resolution::Complete { receipt, metadata } => (Some(receipt.as_str()), None, metadata),
            Resolution::Fail { reason, metadata } => (None, Some(reason.as_str()), metadata),
        };

        let row = sqlx::query_as::<_, PaymentTransaction>(&format!(
            r#"
            UPDATE payment_transactions
            SET state = $2,
                external_receipt = $3,
                failure_reason = $4,
                result_metadata = $5,
                resolved_at = NOW()
            WHERE correlation_id = $1
              AND state IN ('pending', 'timeout')
            RETURNING {COLUMNS}
            "#
        ))
        .bind(correlation_id)
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

        match self.find_by_correlation_id(correlation_id).await? {
            Some(_) => Ok(None),
            None => Err(AppError::NotFound(format!(
                "No transaction for correlation id {}",
                correlation_id
            ))),
        }
    }

    async fn mark_timed_out(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET state = 'timeout'
            WHERE id = $1 AND state = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<PaymentTransaction>> {
        let rows = sqlx::query_as::<_, PaymentTransaction>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM payment_transactions
            WHERE state = 'pending' AND created_at < $1
            ORDER BY created_at
            LIMIT 500
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    async fn count_pending(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payment_transactions WHERE state = 'pending'")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(count)
    }
}
