use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::callback_correlator::CallbackCorrelator;
use super::timeout_monitor::TimeoutMonitor;
use crate::error::{AppError, Result};
use crate::gateway::{Msisdn, PaymentGateway, PushRequest};
use crate::models::{PaymentTransaction, Plan, Subject};
use crate::observability::{get_metrics, mask_phone};
use crate::repositories::Stores;

const ACCOUNT_REFERENCE: &str = "Hotspot";

/// Request to buy a plan for a subject.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    pub phone: String,
    pub plan_id: Uuid,
    /// MAC address or session handle.
    pub subject_handle: String,
    pub appliance_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStarted {
    pub correlation_id: String,
    pub transaction_id: Uuid,
}

/// Opens a push payment and its pending ledger row.
pub struct CheckoutService {
    stores: Stores,
    gateway: Arc<dyn PaymentGateway>,
    correlator: Arc<CallbackCorrelator>,
    monitor: Arc<TimeoutMonitor>,
}

impl CheckoutService {
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        correlator: Arc<CallbackCorrelator>,
        monitor: Arc<TimeoutMonitor>,
    ) -> Self {
        Self {
            stores,
            gateway,
            correlator,
            monitor,
        }
    }

    pub async fn active_plans(&self) -> Result<Vec<Plan>> {
        self.stores.catalog.active_plans().await
    }

    pub async fn request_activation(&self, request: ActivationRequest) -> Result<CheckoutStarted> {
        let phone = Msisdn::parse(&request.phone)?;
        if request.subject_handle.trim().is_empty() {
            return Err(AppError::Validation("Subject id cannot be empty".to_string()));
        }

        let plan = self
            .stores
            .catalog
            .find_plan(request.plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan with id '{}' not found", request.plan_id)))?;
        if !plan.is_active {
            return Err(AppError::Validation(format!("Plan '{}' is not available", plan.name)));
        }

        if let Some(appliance_id) = request.appliance_id {
            if self.stores.catalog.find_appliance(appliance_id).await?.is_none() {
                return Err(AppError::NotFound(format!(
                    "Appliance with id '{}' not found",
                    appliance_id
                )));
            }
        }

        let subject = self
            .stores
            .subjects
            .upsert(
                &Subject::new(request.subject_handle)
                    .with_appliance(request.appliance_id)
                    .with_phone(Some(phone.to_string())),
            )
            .await?;

        let push = PushRequest {
            phone: phone.clone(),
            amount: plan.price,
            account_reference: ACCOUNT_REFERENCE.to_string(),
            description: format!("Payment for {}", plan.name),
        };
        let accepted = match self.gateway.initiate(&push).await {
            Ok(accepted) => accepted,
            Err(e) => {
                get_metrics().record_payment_initiated(false);
                tracing::warn!(phone = %mask_phone(phone.as_str()), plan = %plan.name, "Push payment not started: {}", e);
                return Err(e);
            }
        };

        let transaction = self
            .stores
            .ledger
            .create(&PaymentTransaction::pending(
                subject.id,
                plan.id,
                phone.as_str(),
                plan.price,
                accepted.correlation_id,
                accepted.merchant_request_id,
            ))
            .await?;
        get_metrics().record_payment_initiated(true);
        tracing::info!(
            transaction_id = %transaction.id,
            correlation_id = %transaction.correlation_id,
            subject_id = %subject.id,
            amount = %transaction.amount,
            "Push payment initiated"
        );

        if let Err(e) = self.correlator.replay_payment(&transaction.correlation_id).await {
            tracing::warn!(transaction_id = %transaction.id, "Replay of early callbacks failed: {}", e);
        }
        self.monitor.watch(transaction.id);

        Ok(CheckoutStarted {
            correlation_id: transaction.correlation_id,
            transaction_id: transaction.id,
        })
    }
}
