//! In-memory stores for tests and the `memory` storage backend.
//!
//! Each store guards its map with a `tokio::sync::RwLock`; holding the write
//! lock for the whole check-and-set gives the same atomicity as the
//! conditional updates in the Postgres repositories.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::subject::extended_expiry;
use crate::models::{
    Appliance, CallbackDelivery, CallbackKind, DeliveryOutcome, DisbursementTarget,
    PaymentTransaction, PayoutAttempt, PayoutResolution, Plan, Resolution, Subject, Tenant,
    TransactionState, Voucher,
};
use crate::repositories::ports::{
    CatalogStore, DeliveryLog, PayoutStore, SubjectStore, TransactionLedger, VoucherStore,
};

#[derive(Default, Clone)]
pub struct InMemoryLedger {
    transactions: Arc<RwLock<HashMap<Uuid, PaymentTransaction>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionLedger for InMemoryLedger {
    async fn create(&self, transaction: &PaymentTransaction) -> Result<PaymentTransaction> {
        let mut transactions = self.transactions.write().await;
        if transactions.values().any(|t| t.correlation_id == transaction.correlation_id) {
            return Err(AppError::Validation(format!(
                "Duplicate correlation id {}",
                transaction.correlation_id
            )));
        }
        let mut row = transaction.clone();
        row.state = TransactionState::Pending;
        transactions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Option<PaymentTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.values().find(|t| t.correlation_id == correlation_id).cloned())
    }

    async fn try_transition(
        &self,
        correlation_id: &str,
        resolution: &Resolution,
    ) -> Result<Option<PaymentTransaction>> {
        let mut transactions = self.transactions.write().await;
        let row = transactions
            .values_mut()
            .find(|t| t.correlation_id == correlation_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("No transaction for correlation id {}", correlation_id))
            })?;

        if !row.state.accepts_processor_result() {
            return Ok(None);
        }
        row.apply(resolution)?;
        Ok(Some(row.clone()))
    }

    async fn mark_timed_out(&self, id: Uuid) -> Result<bool> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(&id) {
            Some(row) if row.state == TransactionState::Pending => {
                row.state = TransactionState::Timeout;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<PaymentTransaction>> {
        let transactions = self.transactions.read().await;
        let mut rows: Vec<_> = transactions
            .values()
            .filter(|t| t.state == TransactionState::Pending && t.created_at < cutoff)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.created_at);
        Ok(rows)
    }

    async fn count_pending(&self) -> Result<i64> {
        let transactions = self.transactions.read().await;
        Ok(transactions.values().filter(|t| t.state == TransactionState::Pending).count() as i64)
    }
}

#[derive(Default, Clone)]
pub struct InMemorySubjectStore {
    subjects: Arc<RwLock<HashMap<Uuid, Subject>>>,
}

impl InMemorySubjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubjectStore for InMemorySubjectStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subject>> {
        Ok(self.subjects.read().await.get(&id).cloned())
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<Subject>> {
        let subjects = self.subjects.read().await;
        Ok(subjects.values().find(|s| s.handle == handle).cloned())
    }

    async fn upsert(&self, subject: &Subject) -> Result<Subject> {
        let mut subjects = self.subjects.write().await;
        if let Some(existing) = subjects.values_mut().find(|s| s.handle == subject.handle) {
            if subject.phone.is_some() {
                existing.phone = subject.phone.clone();
            }
            if existing.appliance_id.is_none() {
                existing.appliance_id = subject.appliance_id;
            }
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }
        subjects.insert(subject.id, subject.clone());
        Ok(subject.clone())
    }

    async fn extend_activation(&self, id: Uuid, duration: Duration, plan_id: Uuid) -> Result<Subject> {
        let mut subjects = self.subjects.write().await;
        let subject = subjects
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Subject {} not found", id)))?;
        let now = Utc::now();
        subject.active_until = Some(extended_expiry(subject.active_until, now, duration));
        subject.plan_id = Some(plan_id);
        subject.updated_at = now;
        Ok(subject.clone())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    plans: Arc<RwLock<HashMap<Uuid, Plan>>>,
    appliances: Arc<RwLock<HashMap<Uuid, Appliance>>>,
    tenants: Arc<RwLock<HashMap<Uuid, Tenant>>>,
    targets: Arc<RwLock<Vec<DisbursementTarget>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_plan(&self, plan: Plan) {
        self.plans.write().await.insert(plan.id, plan);
    }

    pub async fn insert_appliance(&self, appliance: Appliance) {
        self.appliances.write().await.insert(appliance.id, appliance);
    }

    pub async fn insert_tenant(&self, tenant: Tenant) {
        self.tenants.write().await.insert(tenant.id, tenant);
    }

    pub async fn insert_target(&self, target: DisbursementTarget) {
        let mut targets = self.targets.write().await;
        targets.retain(|t| t.id != target.id);
        targets.push(target);
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn find_plan(&self, id: Uuid) -> Result<Option<Plan>> {
        Ok(self.plans.read().await.get(&id).cloned())
    }

    async fn active_plans(&self) -> Result<Vec<Plan>> {
        let plans = self.plans.read().await;
        let mut rows: Vec<_> = plans.values().filter(|p| p.is_active).cloned().collect();
        rows.sort_by(|a, b| a.price.cmp(&b.price).then(a.duration_hours.cmp(&b.duration_hours)));
        Ok(rows)
    }

    async fn find_appliance(&self, id: Uuid) -> Result<Option<Appliance>> {
        Ok(self.appliances.read().await.get(&id).cloned())
    }

    async fn find_tenant(&self, id: Uuid) -> Result<Option<Tenant>> {
        Ok(self.tenants.read().await.get(&id).cloned())
    }

    async fn disbursement_targets(&self, tenant_id: Uuid) -> Result<Vec<DisbursementTarget>> {
        let targets = self.targets.read().await;
        Ok(targets
            .iter()
            .filter(|t| t.tenant_id == tenant_id && t.is_active)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryVoucherStore {
    vouchers: Arc<RwLock<HashMap<String, Voucher>>>,
}

impl InMemoryVoucherStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, voucher: Voucher) {
        self.vouchers.write().await.insert(voucher.code.clone(), voucher);
    }
}

#[async_trait]
impl VoucherStore for InMemoryVoucherStore {
    async fn find(&self, code: &str) -> Result<Option<Voucher>> {
        Ok(self.vouchers.read().await.get(code).cloned())
    }

    async fn claim(&self, code: &str, subject_id: Uuid, now: DateTime<Utc>) -> Result<Option<Voucher>> {
        let mut vouchers = self.vouchers.write().await;
        match vouchers.get_mut(code) {
            Some(voucher) if voucher.is_claimable_at(now) => {
                voucher.used_by = Some(subject_id);
                voucher.used_at = Some(now);
                Ok(Some(voucher.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn release(&self, code: &str, subject_id: Uuid) -> Result<bool> {
        let mut vouchers = self.vouchers.write().await;
        match vouchers.get_mut(code) {
            Some(voucher) if voucher.used_by == Some(subject_id) => {
                voucher.used_by = None;
                voucher.used_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPayoutStore {
    attempts: Arc<RwLock<HashMap<Uuid, PayoutAttempt>>>,
}

impl InMemoryPayoutStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayoutStore for InMemoryPayoutStore {
    async fn reserve(&self, attempt: &PayoutAttempt) -> Result<Option<PayoutAttempt>> {
        let mut attempts = self.attempts.write().await;
        if attempts
            .values()
            .any(|a| a.source_transaction_id == attempt.source_transaction_id)
        {
            return Ok(None);
        }
        attempts.insert(attempt.id, attempt.clone());
        Ok(Some(attempt.clone()))
    }

    async fn attach_reference(&self, id: Uuid, reference: &str) -> Result<Option<PayoutAttempt>> {
        let mut attempts = self.attempts.write().await;
        match attempts.get_mut(&id) {
            Some(attempt) if attempt.external_reference.is_none() => {
                attempt.external_reference = Some(reference.to_string());
                Ok(Some(attempt.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_by_source(&self, source_transaction_id: Uuid) -> Result<Option<PayoutAttempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts
            .values()
            .find(|a| a.source_transaction_id == source_transaction_id)
            .cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<PayoutAttempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts
            .values()
            .find(|a| a.external_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn resolve(&self, id: Uuid, resolution: &PayoutResolution) -> Result<Option<PayoutAttempt>> {
        let mut attempts = self.attempts.write().await;
        let attempt = attempts
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Payout attempt {} not found", id)))?;
        if attempt.apply(resolution) {
            Ok(Some(attempt.clone()))
        } else {
            Ok(None)
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryDeliveryLog {
    deliveries: Arc<RwLock<Vec<CallbackDelivery>>>,
}

impl InMemoryDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<CallbackDelivery> {
        self.deliveries.read().await.clone()
    }
}

#[async_trait]
impl DeliveryLog for InMemoryDeliveryLog {
    async fn record(&self, delivery: &CallbackDelivery) -> Result<()> {
        self.deliveries.write().await.push(delivery.clone());
        Ok(())
    }

    async fn parked_for(&self, kind: CallbackKind, correlation_id: &str) -> Result<Vec<CallbackDelivery>> {
        let deliveries = self.deliveries.read().await;
        Ok(deliveries
            .iter()
            .filter(|d| {
                d.kind == kind
                    && d.outcome == DeliveryOutcome::Parked
                    && d.correlation_id.as_deref() == Some(correlation_id)
            })
            .cloned()
            .collect())
    }

    async fn parked_correlation_ids(&self, kind: CallbackKind, limit: i64) -> Result<Vec<String>> {
        let deliveries = self.deliveries.read().await;
        let mut ids: Vec<String> = Vec::new();
        for delivery in deliveries.iter() {
            if delivery.kind != kind || delivery.outcome != DeliveryOutcome::Parked {
                continue;
            }
            if let Some(id) = &delivery.correlation_id {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(ids)
    }

    async fn mark_replayed(&self, id: Uuid) -> Result<bool> {
        let mut deliveries = self.deliveries.write().await;
        match deliveries.iter_mut().find(|d| d.id == id) {
            Some(d) if d.outcome == DeliveryOutcome::Parked => {
                d.outcome = DeliveryOutcome::Replayed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
