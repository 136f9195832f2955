use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::activation_service::{ActivationService, ActivationSource};
use crate::error::{AppError, Result};
use crate::models::voucher::normalize_code;
use crate::models::{Plan, Subject};
use crate::observability::get_metrics;
use crate::repositories::Stores;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub plan: Plan,
    pub active_until: DateTime<Utc>,
}

/// Converts a prepaid voucher into an activation.
pub struct VoucherService {
    stores: Stores,
    activation: Arc<ActivationService>,
}

impl VoucherService {
    pub fn new(stores: Stores, activation: Arc<ActivationService>) -> Self {
        Self { stores, activation }
    }

    pub async fn redeem(&self, code: &str, subject_handle: &str) -> Result<Redemption> {
        let result = self.try_redeem(code, subject_handle).await;
        let outcome = match &result {
            Ok(_) => "redeemed",
            Err(AppError::AlreadyUsed(_)) => "already_used",
            Err(AppError::Expired(_)) => "expired",
            Err(AppError::NotFound(_)) => "not_found",
            Err(_) => "error",
        };
        get_metrics().record_voucher_redemption(outcome);
        result
    }

    async fn try_redeem(&self, code: &str, subject_handle: &str) -> Result<Redemption> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(AppError::Validation("Voucher code cannot be empty".to_string()));
        }
        if subject_handle.trim().is_empty() {
            return Err(AppError::Validation("Subject id cannot be empty".to_string()));
        }

        let voucher = self
            .stores
            .vouchers
            .find(&code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Voucher '{}' not found", code)))?;
        if self.stores.catalog.find_plan(voucher.plan_id).await?.is_none() {
            tracing::error!(code = %code, plan_id = %voucher.plan_id, "Invariant violation: voucher references a missing plan");
            return Err(AppError::NotFound(format!("Plan with id '{}' not found", voucher.plan_id)));
        }

        let subject = self.stores.subjects.upsert(&Subject::new(subject_handle)).await?;

        let now = Utc::now();
        if voucher.is_used() {
            return Err(AppError::AlreadyUsed(code));
        }
        if voucher.is_expired_at(now) {
            return Err(AppError::Expired(code));
        }
        if self.stores.vouchers.claim(&code, subject.id, now).await?.is_none() {
            // Lost the claim: report why from the current row.
            let current = self.stores.vouchers.find(&code).await?;
            return match current {
                Some(v) if v.is_expired_at(now) && !v.is_used() => Err(AppError::Expired(code)),
                _ => Err(AppError::AlreadyUsed(code)),
            };
        }

        match self
            .activation
            .activate(&subject, voucher.plan_id, ActivationSource::Voucher(code.clone()))
            .await
        {
            Ok(activation) => {
                tracing::info!(code = %code, subject_id = %subject.id, "Voucher redeemed");
                Ok(Redemption {
                    plan: activation.plan,
                    active_until: activation.active_until,
                })
            }
            Err(e) => {
                if let Err(release_err) = self.stores.vouchers.release(&code, subject.id).await {
                    tracing::error!(code = %code, "Failed to release voucher claim: {}", release_err);
                }
                Err(e)
            }
        }
    }
}
