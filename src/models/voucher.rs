use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Voucher {
    pub code: String,
    pub plan_id: Uuid,
    pub used_by: Option<Uuid>,
    pub used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Voucher {
    pub fn new(code: impl Into<String>, plan_id: Uuid) -> Self {
        Self {
            code: normalize_code(&code.into()),
            plan_id,
            used_by: None,
            used_at: None,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_used(&self) -> bool {
        self.used_by.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Returns true if a claim at `now` would succeed.
    pub fn is_claimable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_used() && !self.is_expired_at(now)
    }
}

/// Vouchers are matched case-insensitively on trimmed input.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
