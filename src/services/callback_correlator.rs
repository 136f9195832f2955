//! Maps processor webhooks onto ledger and payout rows.
//!
//! Every delivery is acknowledged and recorded whatever happens here. The
//! conditional transition in the store is the only thing that decides whether
//! side effects run, so retried or concurrent deliveries trigger them once.

use std::sync::Arc;

use super::activation_service::{ActivationService, ActivationSource};
use super::payout_service::PayoutService;
use crate::error::{AppError, Result};
use crate::models::{
    Callback, CallbackDelivery, CallbackKind, DeliveryOutcome, PaymentOutcome, PaymentResult,
    Resolution, TransactionState,
};
use crate::observability::{get_metrics, mask_sensitive};
use crate::repositories::Stores;

pub struct CallbackCorrelator {
    stores: Stores,
    activation: Arc<ActivationService>,
    payouts: Arc<PayoutService>,
}

impl CallbackCorrelator {
    pub fn new(stores: Stores, activation: Arc<ActivationService>, payouts: Arc<PayoutService>) -> Self {
        Self {
            stores,
            activation,
            payouts,
        }
    }

    /// Handles one raw webhook body. Never fails; the caller always acknowledges.
    pub async fn handle(&self, kind: CallbackKind, body: &[u8]) -> DeliveryOutcome {
        let callback = Callback::parse(kind, body);

        let result = match &callback {
            Callback::Malformed { reason } => {
                tracing::warn!(kind = kind.as_str(), reason = %reason, "Malformed webhook acknowledged");
                Ok(DeliveryOutcome::Malformed)
            }
            Callback::Payment(result) => self.apply_payment(result).await,
            Callback::Payout(result) => self.payouts.apply_callback(result).await,
        };

        // A store failure leaves the delivery parked so it can still be replayed.
        let outcome = result.unwrap_or_else(|e| {
            tracing::error!(kind = kind.as_str(), "Webhook processing failed: {}", e);
            DeliveryOutcome::Parked
        });

        let mut delivery = CallbackDelivery::new(kind, body, outcome);
        if let Some(correlation_id) = callback.correlation_id() {
            delivery = delivery.correlated(correlation_id);
        }
        if let Err(e) = self.stores.deliveries.record(&delivery).await {
            tracing::error!(kind = kind.as_str(), "Failed to record webhook delivery: {}", e);
        }
        get_metrics().record_callback(kind.as_str(), outcome.as_str());

        // The row may have been created between the lookup and the record above.
        if outcome == DeliveryOutcome::Parked {
            if let Some(correlation_id) = callback.correlation_id() {
                let replay = match kind {
                    CallbackKind::PaymentResult => self.replay_payment(correlation_id).await,
                    CallbackKind::PayoutResult | CallbackKind::PayoutTimeout => {
                        self.payouts.replay_parked(correlation_id).await
                    }
                };
                if let Err(e) = replay {
                    tracing::warn!(correlation_id = %correlation_id, "Replay after parking failed: {}", e);
                }
            }
        }

        outcome
    }

    async fn apply_payment(&self, result: &PaymentResult) -> Result<DeliveryOutcome> {
        let resolution = match &result.outcome {
            PaymentOutcome::Succeeded { receipt, .. } => Resolution::Complete {
                receipt: receipt.clone(),
                metadata: result.raw.clone(),
            },
            PaymentOutcome::Failed { reason, .. } => Resolution::Fail {
                reason: reason.clone(),
                metadata: result.raw.clone(),
            },
        };

        let transaction = match self
            .stores
            .ledger
            .try_transition(&result.correlation_id, &resolution)
            .await
        {
            Ok(Some(transaction)) => transaction,
            Ok(None) => {
                tracing::info!(correlation_id = %result.correlation_id, "Duplicate payment callback ignored");
                return Ok(DeliveryOutcome::Duplicate);
            }
            Err(AppError::NotFound(_)) => {
                tracing::warn!(correlation_id = %result.correlation_id, "Payment callback for unknown transaction parked");
                return Ok(DeliveryOutcome::Parked);
            }
            Err(e) => return Err(e),
        };

        get_metrics().record_payment_resolved(transaction.state.as_str());

        if let PaymentOutcome::Succeeded { receipt, amount: Some(paid), .. } = &result.outcome {
            if *paid != transaction.amount {
                tracing::warn!(
                    transaction_id = %transaction.id,
                    expected = %transaction.amount,
                    paid = %paid,
                    "Paid amount differs from the ledger amount"
                );
            }
            tracing::info!(
                transaction_id = %transaction.id,
                receipt = %mask_sensitive(receipt, 2),
                "Payment completed"
            );
        }

        if transaction.state != TransactionState::Completed {
            tracing::info!(
                transaction_id = %transaction.id,
                reason = transaction.failure_reason.as_deref().unwrap_or_default(),
                "Payment failed"
            );
            return Ok(DeliveryOutcome::Applied);
        }

        match self.stores.subjects.find_by_id(transaction.subject_id).await {
            Ok(Some(subject)) => {
                let plan_id = transaction.plan_id;
                if let Err(e) = self
                    .activation
                    .activate(&subject, plan_id, ActivationSource::Payment(transaction.clone()))
                    .await
                {
                    tracing::error!(transaction_id = %transaction.id, "Activation after payment failed: {}", e);
                }
            }
            Ok(None) => tracing::error!(
                transaction_id = %transaction.id,
                subject_id = %transaction.subject_id,
                "Invariant violation: completed transaction references a missing subject"
            ),
            Err(e) => tracing::error!(transaction_id = %transaction.id, "Subject lookup failed: {}", e),
        }

        Ok(DeliveryOutcome::Applied)
    }

    /// Applies payment callbacks parked before the ledger row existed or while the store was failing.
    ///
    /// A delivery is marked replayed only after it applied, so one that fails
    /// again stays parked for the next sweep.
    pub async fn replay_payment(&self, correlation_id: &str) -> Result<usize> {
        if self.stores.ledger.find_by_correlation_id(correlation_id).await?.is_none() {
            return Ok(0);
        }

        let mut replayed = 0;
        let parked = self
            .stores
            .deliveries
            .parked_for(CallbackKind::PaymentResult, correlation_id)
            .await?;
        for delivery in parked {
            let callback = delivery
                .payload
                .clone()
                .map(|payload| Callback::from_value(CallbackKind::PaymentResult, payload));
            let outcome = match callback {
                Some(Callback::Payment(result)) => self.apply_payment(&result).await?,
                _ => DeliveryOutcome::Malformed,
            };
            if outcome == DeliveryOutcome::Parked {
                continue;
            }
            if self.stores.deliveries.mark_replayed(delivery.id).await? {
                tracing::info!(
                    correlation_id = %correlation_id,
                    outcome = outcome.as_str(),
                    "Parked payment callback replayed"
                );
                replayed += 1;
            }
        }
        Ok(replayed)
    }

    /// Retries every parked delivery whose ledger or payout row now exists.
    pub async fn replay_all_parked(&self, limit: i64) -> Result<usize> {
        let mut replayed = 0;

        for kind in [CallbackKind::PaymentResult, CallbackKind::PayoutResult, CallbackKind::PayoutTimeout] {
            for correlation_id in self.stores.deliveries.parked_correlation_ids(kind, limit).await? {
                let result = match kind {
                    CallbackKind::PaymentResult => self.replay_payment(&correlation_id).await,
                    CallbackKind::PayoutResult | CallbackKind::PayoutTimeout => {
                        self.payouts.replay_parked(&correlation_id).await
                    }
                };
                match result {
                    Ok(count) => replayed += count,
                    Err(e) => {
                        tracing::warn!(correlation_id = %correlation_id, "Replay of parked callbacks failed: {}", e)
                    }
                }
            }
        }

        Ok(replayed)
    }
}
