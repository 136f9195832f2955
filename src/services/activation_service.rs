use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::effects::{best_effort, EffectOutcome};
use super::payout_service::PayoutService;
use crate::appliance::{ApplianceProvisioner, HotspotCredential};
use crate::config::ActivationSettings;
use crate::error::{AppError, Result};
use crate::models::{PaymentTransaction, Plan, Subject};
use crate::observability::get_metrics;
use crate::repositories::Stores;

/// What paid for an activation.
#[derive(Debug, Clone)]
pub enum ActivationSource {
    Payment(PaymentTransaction),
    Voucher(String),
}

impl ActivationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationSource::Payment(_) => "payment",
            ActivationSource::Voucher(_) => "voucher",
        }
    }
}

/// Result of one activation, including how each side effect went.
#[derive(Debug, Clone)]
pub struct Activation {
    pub subject: Subject,
    pub plan: Plan,
    pub active_until: DateTime<Utc>,
    pub provisioning: EffectOutcome,
    pub payout: EffectOutcome,
}

/// Grants access for a completed payment or a claimed voucher.
///
/// Only the plan lookup and the expiry update can fail an activation.
/// Provisioning and payout run afterwards under their own budgets and
/// never undo the grant.
pub struct ActivationService {
    stores: Stores,
    provisioner: Arc<dyn ApplianceProvisioner>,
    payouts: Arc<PayoutService>,
    provisioning_budget: Duration,
    payout_budget: Duration,
}

impl ActivationService {
    pub fn new(
        stores: Stores,
        provisioner: Arc<dyn ApplianceProvisioner>,
        payouts: Arc<PayoutService>,
        settings: &ActivationSettings,
    ) -> Self {
        Self {
            stores,
            provisioner,
            payouts,
            provisioning_budget: settings.provisioning_budget(),
            payout_budget: settings.payout_budget(),
        }
    }

    pub async fn activate(
        &self,
        subject: &Subject,
        plan_id: uuid::Uuid,
        source: ActivationSource,
    ) -> Result<Activation> {
        let Some(plan) = self.stores.catalog.find_plan(plan_id).await? else {
            tracing::error!(
                subject_id = %subject.id,
                plan_id = %plan_id,
                source = source.as_str(),
                "Invariant violation: activation references a missing plan"
            );
            return Err(AppError::NotFound(format!("Plan with id '{}' not found", plan_id)));
        };

        let subject = self
            .stores
            .subjects
            .extend_activation(subject.id, plan.duration(), plan.id)
            .await?;
        let active_until = subject.active_until.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("subject {} has no expiry after activation", subject.id))
        })?;

        get_metrics().record_activation(source.as_str());
        tracing::info!(
            subject_id = %subject.id,
            plan = %plan.name,
            source = source.as_str(),
            active_until = %active_until,
            "Subject activated"
        );

        let provisioning = match subject.appliance_id {
            Some(_) => {
                best_effort("provisioning", self.provisioning_budget, self.provision(&subject, &plan)).await
            }
            None => EffectOutcome::Skipped("subject has no appliance".to_string()),
        };

        let payout = match &source {
            ActivationSource::Payment(transaction) => {
                best_effort("payout", self.payout_budget, self.payouts.disburse_for(transaction, &subject)).await
            }
            ActivationSource::Voucher(_) => EffectOutcome::Skipped("voucher activations carry no payout".to_string()),
        };

        Ok(Activation {
            subject,
            plan,
            active_until,
            provisioning,
            payout,
        })
    }

    async fn provision(&self, subject: &Subject, plan: &Plan) -> Result<EffectOutcome> {
        let Some(appliance_id) = subject.appliance_id else {
            return Ok(EffectOutcome::Skipped("subject has no appliance".to_string()));
        };
        let Some(appliance) = self.stores.catalog.find_appliance(appliance_id).await? else {
            return Ok(EffectOutcome::Skipped(format!("appliance {} not found", appliance_id)));
        };
        if !appliance.is_active {
            return Ok(EffectOutcome::Skipped(format!("appliance {} is inactive", appliance.name)));
        }

        let credential = HotspotCredential::for_subject(subject, plan);
        self.provisioner.provision(&appliance, &credential).await?;
        Ok(EffectOutcome::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Appliance;
    use crate::repositories::{
        InMemoryDeliveryLog, InMemoryLedger, InMemoryPayoutStore, InMemorySubjectStore,
        InMemoryVoucherStore, MockCatalogStore, SubjectStore,
    };
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct Unreachable;

    #[async_trait]
    impl ApplianceProvisioner for Unreachable {
        async fn provision(&self, appliance: &Appliance, _: &HotspotCredential) -> Result<()> {
            Err(AppError::ProvisioningFailed(format!("{} unreachable", appliance.name)))
        }
    }

    struct NoGateway;

    #[async_trait]
    impl crate::gateway::PaymentGateway for NoGateway {
        async fn initiate(&self, _: &crate::gateway::PushRequest) -> Result<crate::gateway::PushAccepted> {
            Err(AppError::GatewayUnavailable("offline".into()))
        }

        async fn query_status(&self, _: &str) -> Result<crate::gateway::PushStatus> {
            Err(AppError::GatewayUnavailable("offline".into()))
        }

        async fn disburse(
            &self,
            _: &crate::gateway::DisbursementRequest,
        ) -> Result<crate::gateway::DisbursementAccepted> {
            Err(AppError::GatewayUnavailable("offline".into()))
        }
    }

    fn stores_with(catalog: MockCatalogStore, subjects: InMemorySubjectStore) -> Stores {
        Stores {
            ledger: Arc::new(InMemoryLedger::new()),
            subjects: Arc::new(subjects),
            catalog: Arc::new(catalog),
            vouchers: Arc::new(InMemoryVoucherStore::new()),
            payouts: Arc::new(InMemoryPayoutStore::new()),
            deliveries: Arc::new(InMemoryDeliveryLog::new()),
        }
    }

    fn service(stores: Stores) -> ActivationService {
        let payouts = Arc::new(PayoutService::new(stores.clone(), Arc::new(NoGateway), dec!(80)));
        ActivationService::new(stores, Arc::new(Unreachable), payouts, &ActivationSettings::default())
    }

    #[tokio::test]
    async fn test_missing_plan_is_a_hard_error() {
        let mut catalog = MockCatalogStore::new();
        catalog.expect_find_plan().returning(|_| Ok(None));
        let subjects = InMemorySubjectStore::new();
        let subject = subjects.upsert(&Subject::new("aa:bb:cc:dd:ee:ff")).await.unwrap();

        let err = service(stores_with(catalog, subjects.clone()))
            .activate(&subject, uuid::Uuid::new_v4(), ActivationSource::Voucher("X".into()))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        let stored = subjects.find_by_id(subject.id).await.unwrap().unwrap();
        assert!(stored.active_until.is_none());
    }

    #[tokio::test]
    async fn test_provisioning_failure_keeps_the_grant() {
        let plan = Plan::new("Hourly", dec!(10), 1, 5);
        let appliance = Appliance::new("core", "https://10.0.0.1", "admin", "secret");
        let appliance_id = appliance.id;

        let mut catalog = MockCatalogStore::new();
        let returned_plan = plan.clone();
        catalog.expect_find_plan().returning(move |_| Ok(Some(returned_plan.clone())));
        catalog.expect_find_appliance().returning(move |_| Ok(Some(appliance.clone())));

        let subjects = InMemorySubjectStore::new();
        let subject = subjects
            .upsert(&Subject::new("aa:bb:cc:dd:ee:ff").with_appliance(Some(appliance_id)))
            .await
            .unwrap();

        let activation = service(stores_with(catalog, subjects))
            .activate(&subject, plan.id, ActivationSource::Voucher("X".into()))
            .await
            .unwrap();

        assert!(activation.active_until > Utc::now());
        assert!(matches!(activation.provisioning, EffectOutcome::Failed(_)));
        assert!(matches!(activation.payout, EffectOutcome::Skipped(_)));
    }
}
