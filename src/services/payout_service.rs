use rust_decimal::Decimal;
use std::sync::Arc;

use super::effects::EffectOutcome;
use crate::error::{AppError, Result};
use crate::gateway::{DisbursementRequest, PaymentGateway};
use crate::models::{
    beneficiary_share, select_target, Callback, CallbackKind, DeliveryOutcome, PaymentTransaction,
    PayoutAttempt, PayoutOutcome, PayoutResolution, PayoutResult, PayoutState, Subject,
};
use crate::observability::get_metrics;
use crate::repositories::Stores;

/// Pays the tenant's share of a completed payment to its disbursement target.
///
/// Failed payouts stay as audit records. Nothing here retries them.
pub struct PayoutService {
    stores: Stores,
    gateway: Arc<dyn PaymentGateway>,
    default_share_percent: Decimal,
}

impl PayoutService {
    pub fn new(stores: Stores, gateway: Arc<dyn PaymentGateway>, default_share_percent: Decimal) -> Self {
        Self {
            stores,
            gateway,
            default_share_percent,
        }
    }

    /// Issues the disbursement for `transaction`, at most once per transaction.
    pub async fn disburse_for(
        &self,
        transaction: &PaymentTransaction,
        subject: &Subject,
    ) -> Result<EffectOutcome> {
        let Some(appliance_id) = subject.appliance_id else {
            return Ok(EffectOutcome::Skipped("subject has no appliance".to_string()));
        };
        let Some(appliance) = self.stores.catalog.find_appliance(appliance_id).await? else {
            return Ok(EffectOutcome::Skipped(format!("appliance {} not found", appliance_id)));
        };
        let Some(tenant_id) = appliance.tenant_id else {
            return Ok(EffectOutcome::Skipped(format!("appliance {} has no tenant", appliance.name)));
        };
        let Some(tenant) = self.stores.catalog.find_tenant(tenant_id).await? else {
            return Ok(EffectOutcome::Skipped(format!("tenant {} not found", tenant_id)));
        };

        let targets = self.stores.catalog.disbursement_targets(tenant.id).await?;
        let Some(target) = select_target(&targets, appliance.id) else {
            get_metrics().record_payout("skipped");
            return Ok(EffectOutcome::Skipped(format!("no disbursement target for {}", tenant.name)));
        };

        let share_percent = tenant.share_percent.unwrap_or(self.default_share_percent);
        let share = beneficiary_share(transaction.amount, share_percent);
        if share <= Decimal::ZERO {
            get_metrics().record_payout("skipped");
            return Ok(EffectOutcome::Skipped("beneficiary share is zero".to_string()));
        }

        let attempt = PayoutAttempt::initiated(transaction.id, tenant.id, target.id, share);
        let Some(attempt) = self.stores.payouts.reserve(&attempt).await? else {
            return Ok(EffectOutcome::Skipped(format!(
                "payout for transaction {} already reserved",
                transaction.id
            )));
        };

        let request = DisbursementRequest {
            amount: share,
            paybill: target.paybill.clone(),
            account_reference: target.account_reference.clone(),
            remarks: format!("Hotspot share {}", transaction.id),
        };

        match self.gateway.disburse(&request).await {
            Ok(accepted) => {
                self.stores
                    .payouts
                    .attach_reference(attempt.id, &accepted.conversation_id)
                    .await?;
                get_metrics().record_payout("initiated");
                tracing::info!(
                    payout_id = %attempt.id,
                    transaction_id = %transaction.id,
                    tenant = %tenant.name,
                    share = %share,
                    conversation_id = %accepted.conversation_id,
                    "Payout initiated"
                );

                if let Err(e) = self.replay_parked(&accepted.conversation_id).await {
                    tracing::warn!(conversation_id = %accepted.conversation_id, "Payout replay failed: {}", e);
                }
                Ok(EffectOutcome::Succeeded)
            }
            Err(e) => {
                let reason = e.to_string();
                self.stores
                    .payouts
                    .resolve(attempt.id, &PayoutResolution::Fail { reason: reason.clone(), metadata: None })
                    .await?;
                get_metrics().record_payout("failed");
                tracing::error!(
                    payout_id = %attempt.id,
                    transaction_id = %transaction.id,
                    "Payout request failed: {}",
                    reason
                );
                Err(AppError::PayoutFailed(reason))
            }
        }
    }

    /// Applies a payout-result or payout-timeout webhook.
    pub async fn apply_callback(&self, result: &PayoutResult) -> Result<DeliveryOutcome> {
        let Some(attempt) = self.stores.payouts.find_by_reference(&result.correlation_id).await? else {
            tracing::warn!(conversation_id = %result.correlation_id, "Payout callback for unknown reference parked");
            return Ok(DeliveryOutcome::Parked);
        };

        let resolution = match &result.outcome {
            PayoutOutcome::Succeeded { receipt } => PayoutResolution::Complete {
                receipt: receipt.clone(),
                metadata: result.raw.clone(),
            },
            PayoutOutcome::Failed { reason, .. } => PayoutResolution::Fail {
                reason: reason.clone(),
                metadata: Some(result.raw.clone()),
            },
        };

        match self.stores.payouts.resolve(attempt.id, &resolution).await? {
            Some(resolved) => {
                get_metrics().record_payout(resolved.state.as_str());
                if resolved.state == PayoutState::Failed {
                    tracing::error!(
                        payout_id = %resolved.id,
                        source_transaction_id = %resolved.source_transaction_id,
                        reason = resolved.failure_reason.as_deref().unwrap_or_default(),
                        "Payout failed"
                    );
                } else {
                    tracing::info!(payout_id = %resolved.id, "Payout completed");
                }
                Ok(DeliveryOutcome::Applied)
            }
            None => {
                tracing::info!(payout_id = %attempt.id, "Duplicate payout callback ignored");
                Ok(DeliveryOutcome::Duplicate)
            }
        }
    }

    /// Applies payout callbacks parked before the ConversationID was stored or while the store was failing.
    pub async fn replay_parked(&self, reference: &str) -> Result<usize> {
        if self.stores.payouts.find_by_reference(reference).await?.is_none() {
            return Ok(0);
        }

        let mut replayed = 0;
        for kind in [CallbackKind::PayoutResult, CallbackKind::PayoutTimeout] {
            for delivery in self.stores.deliveries.parked_for(kind, reference).await? {
                let outcome = match delivery.payload.clone().map(|p| Callback::from_value(kind, p)) {
                    Some(Callback::Payout(result)) => self.apply_callback(&result).await?,
                    _ => DeliveryOutcome::Malformed,
                };
                if outcome == DeliveryOutcome::Parked {
                    continue;
                }
                if self.stores.deliveries.mark_replayed(delivery.id).await? {
                    tracing::info!(
                        conversation_id = reference,
                        outcome = outcome.as_str(),
                        "Parked payout callback replayed"
                    );
                    replayed += 1;
                }
            }
        }
        Ok(replayed)
    }
}
