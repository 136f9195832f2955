use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Appliance, CallbackDelivery, CallbackKind, DisbursementTarget, PaymentTransaction,
    PayoutAttempt, PayoutResolution, Plan, Resolution, Subject, Tenant, Voucher,
};

/// Durable record of every push-payment attempt.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    async fn create(&self, transaction: &PaymentTransaction) -> Result<PaymentTransaction>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentTransaction>>;

    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Option<PaymentTransaction>>;

    /// Applies a processor result with a single conditional update.
    ///
    /// Returns `Some` with the updated row when this call won the transition,
    /// `None` when the row was already completed or failed, and
    /// `AppError::NotFound` when no row carries the correlation id.
    async fn try_transition(
        &self,
        correlation_id: &str,
        resolution: &Resolution,
    ) -> Result<Option<PaymentTransaction>>;

    /// Moves a pending row to timeout. Returns false if it was no longer pending.
    async fn mark_timed_out(&self, id: Uuid) -> Result<bool>;

    async fn list_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<PaymentTransaction>>;

    async fn count_pending(&self) -> Result<i64>;
}

#[async_trait]
pub trait SubjectStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subject>>;

    async fn find_by_handle(&self, handle: &str) -> Result<Option<Subject>>;

    /// Inserts the subject on first sight of its handle. An existing row keeps
    /// its credentials and appliance; a missing phone or appliance is filled in.
    async fn upsert(&self, subject: &Subject) -> Result<Subject>;

    /// Atomically sets `active_until = max(active_until, now) + duration`.
    async fn extend_activation(&self, id: Uuid, duration: Duration, plan_id: Uuid) -> Result<Subject>;
}

/// Reference data owned by the admin surface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_plan(&self, id: Uuid) -> Result<Option<Plan>>;

    /// Plans on sale, cheapest first.
    async fn active_plans(&self) -> Result<Vec<Plan>>;

    async fn find_appliance(&self, id: Uuid) -> Result<Option<Appliance>>;

    async fn find_tenant(&self, id: Uuid) -> Result<Option<Tenant>>;

    async fn disbursement_targets(&self, tenant_id: Uuid) -> Result<Vec<DisbursementTarget>>;
}

#[async_trait]
pub trait VoucherStore: Send + Sync {
    async fn find(&self, code: &str) -> Result<Option<Voucher>>;

    /// Marks the voucher used by `subject_id` if it is unused and unexpired at `now`.
    /// Returns `None` if another redemption won or the voucher is expired.
    async fn claim(&self, code: &str, subject_id: Uuid, now: DateTime<Utc>) -> Result<Option<Voucher>>;

    /// Undoes a claim held by `subject_id`.
    async fn release(&self, code: &str, subject_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait PayoutStore: Send + Sync {
    /// Inserts the attempt unless one already exists for its source transaction.
    async fn reserve(&self, attempt: &PayoutAttempt) -> Result<Option<PayoutAttempt>>;

    async fn attach_reference(&self, id: Uuid, reference: &str) -> Result<Option<PayoutAttempt>>;

    async fn find_by_source(&self, source_transaction_id: Uuid) -> Result<Option<PayoutAttempt>>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<PayoutAttempt>>;

    /// Same contract as [`TransactionLedger::try_transition`], keyed by attempt id.
    async fn resolve(&self, id: Uuid, resolution: &PayoutResolution) -> Result<Option<PayoutAttempt>>;
}

/// Append-only webhook audit log.
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    async fn record(&self, delivery: &CallbackDelivery) -> Result<()>;

    async fn parked_for(&self, kind: CallbackKind, correlation_id: &str) -> Result<Vec<CallbackDelivery>>;

    /// Distinct correlation ids that still have parked deliveries of `kind`, oldest first.
    async fn parked_correlation_ids(&self, kind: CallbackKind, limit: i64) -> Result<Vec<String>>;

    /// Flips a parked delivery to replayed. Returns false if another worker already took it.
    async fn mark_replayed(&self, id: Uuid) -> Result<bool>;
}
