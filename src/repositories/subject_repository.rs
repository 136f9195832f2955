use async_trait::async_trait;
use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Subject;
use crate::repositories::ports::SubjectStore;

const COLUMNS: &str =
    "id, handle, phone, active_until, appliance_id, plan_id, username, password, created_at, updated_at";

pub struct SubjectRepository {
    pool: PgPool,
}

impl SubjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubjectStore for SubjectRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subject>> {
        let row = sqlx::query_as::<_, Subject>(&format!("SELECT {COLUMNS} FROM subjects WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<Subject>> {
        let row = sqlx::query_as::<_, Subject>(&format!("SELECT {COLUMNS} FROM subjects WHERE handle = $1"))
            .bind(handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn upsert(&self, subject: &Subject) -> Result<Subject> {
        let row = sqlx::query_as::<_, Subject>(&format!(
            r#"
            INSERT INTO subjects ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (handle) DO UPDATE SET
                phone = COALESCE(EXCLUDED.phone, subjects.phone),
                appliance_id = COALESCE(subjects.appliance_id, EXCLUDED.appliance_id),
                updated_at = NOW()
            RETURNING {COLUMNS}
            "#
        ))
        .bind(subject.id)
        .bind(&subject.handle)
        .bind(&subject.phone)
        .bind(subject.active_until)
        .bind(subject.appliance_id)
        .bind(subject.plan_id)
        .bind(&subject.username)
        .bind(&subject.password)
        .bind(subject.created_at)
        .bind(subject.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn extend_activation(&self, id: Uuid, duration: Duration, plan_id: Uuid) -> Result<Subject> {
        // Row lock serializes concurrent grants; each extends the last committed expiry.
        let row = sqlx::query_as::<_, Subject>(&format!(
            r#"
            UPDATE subjects
            SET active_until = GREATEST(COALESCE(active_until, NOW()), NOW()) + ($2::BIGINT * INTERVAL '1 second'),
                plan_id = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(duration.num_seconds())
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::NotFound(format!("Subject {} not found", id)))
    }
}
