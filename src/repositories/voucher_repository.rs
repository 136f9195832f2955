use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Voucher;
use crate::repositories::ports::VoucherStore;

pub struct VoucherRepository {
    pool: PgPool,
}

impl VoucherRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VoucherStore for VoucherRepository {
    async fn find(&self, code: &str) -> Result<Option<Voucher>> {
        let row = sqlx::query_as::<_, Voucher>(
            r#"
            SELECT code, plan_id, used_by, used_at, expires_at, created_at
            FROM vouchers
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn claim(&self, code: &str, subject_id: Uuid, now: DateTime<Utc>) -> Result<Option<Voucher>> {
        let row = sqlx::query_as::<_, Voucher>(
            r#"
            UPDATE vouchers
            SET used_by = $2, used_at = $3
            WHERE code = $1
              AND used_by IS NULL
              AND (expires_at IS NULL OR expires_at > $3)
            RETURNING code, plan_id, used_by, used_at, expires_at, created_at
            "#,
        )
        .bind(code)
        .bind(subject_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn release(&self, code: &str, subject_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE vouchers SET used_by = NULL, used_at = NULL WHERE code = $1 AND used_by = $2",
        )
        .bind(code)
        .bind(subject_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
