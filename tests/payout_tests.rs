mod common;

use common::{payment_success, payout_result, Harness};
use hotspot_billing::models::{CallbackKind, DeliveryOutcome, DisbursementTarget, PayoutState};
use hotspot_billing::repositories::PayoutStore;
use hotspot_billing::services::{ActivationRequest, CheckoutStarted};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::atomic::Ordering;
use uuid::Uuid;

async fn pay(h: &Harness, price: u64, appliance_id: Option<Uuid>) -> CheckoutStarted {
    let plan = h.seed_plan(Decimal::from(price), 1, 5).await;
    let started = h
        .services
        .checkout
        .request_activation(ActivationRequest {
            phone: "0712345678".into(),
            plan_id: plan.id,
            subject_handle: format!("session-{}", Uuid::new_v4()),
            appliance_id,
        })
        .await
        .unwrap();
    h.services
        .correlator
        .handle(
            CallbackKind::PaymentResult,
            &payment_success(&started.correlation_id, price, "QKPAID"),
        )
        .await;
    started
}

#[tokio::test]
async fn test_share_is_floored_and_disbursed() {
    let h = Harness::new();
    let site = h.seed_site(Some(dec!(75))).await;

    let started = pay(&h, 19, Some(site.appliance.id)).await;

    let disbursements = h.gateway.disbursements.lock().unwrap().clone();
    assert_eq!(disbursements.len(), 1);
    assert_eq!(disbursements[0].amount, dec!(14));
    assert_eq!(disbursements[0].paybill, "888880");
    assert_eq!(disbursements[0].account_reference, "KIBERA");

    let attempt = h.payouts.find_by_source(started.transaction_id).await.unwrap().unwrap();
    assert_eq!(attempt.state, PayoutState::Initiated);
    assert_eq!(attempt.beneficiary_share, dec!(14));
    assert_eq!(attempt.external_reference.as_deref(), Some("AG_1"));
    assert_eq!(attempt.tenant_id, site.tenant.id);
}

#[tokio::test]
async fn test_appliance_target_preferred_over_tenant_wide() {
    let h = Harness::new();
    let site = h.seed_site(None).await;
    let specific = DisbursementTarget::new(site.tenant.id, "555555", "SITE-A").for_appliance(site.appliance.id);
    h.catalog.insert_target(specific.clone()).await;

    let started = pay(&h, 50, Some(site.appliance.id)).await;

    let attempt = h.payouts.find_by_source(started.transaction_id).await.unwrap().unwrap();
    assert_eq!(attempt.target_id, specific.id);
    assert_eq!(h.gateway.disbursements.lock().unwrap()[0].amount, dec!(40));
}

#[tokio::test]
async fn test_no_target_or_no_appliance_means_no_payout() {
    let h = Harness::new();

    let started = pay(&h, 50, None).await;
    assert!(h.payouts.find_by_source(started.transaction_id).await.unwrap().is_none());

    let mut other = h.seed_site(None).await;
    other.target.is_active = false;
    h.catalog.insert_target(other.target.clone()).await;
    let started = pay(&h, 50, Some(other.appliance.id)).await;
    assert!(h.payouts.find_by_source(started.transaction_id).await.unwrap().is_none());

    assert_eq!(h.gateway.disbursement_count(), 0);
}

#[tokio::test]
async fn test_zero_share_is_skipped() {
    let h = Harness::new();
    let site = h.seed_site(Some(dec!(0))).await;

    let started = pay(&h, 50, Some(site.appliance.id)).await;

    assert!(h.payouts.find_by_source(started.transaction_id).await.unwrap().is_none());
    assert_eq!(h.gateway.disbursement_count(), 0);
}

#[tokio::test]
async fn test_payout_result_completes_once() {
    let h = Harness::new();
    let site = h.seed_site(None).await;
    let started = pay(&h, 10, Some(site.appliance.id)).await;

    let body = payout_result("AG_1", 0, "The service request is processed successfully.");
    let first = h.services.correlator.handle(CallbackKind::PayoutResult, &body).await;
    let second = h.services.correlator.handle(CallbackKind::PayoutResult, &body).await;
    let late_timeout = h.services.correlator.handle(CallbackKind::PayoutTimeout, &body).await;

    assert_eq!(first, DeliveryOutcome::Applied);
    assert_eq!(second, DeliveryOutcome::Duplicate);
    assert_eq!(late_timeout, DeliveryOutcome::Duplicate);

    let attempt = h.payouts.find_by_source(started.transaction_id).await.unwrap().unwrap();
    assert_eq!(attempt.state, PayoutState::Completed);
    assert_eq!(attempt.external_receipt.as_deref(), Some("QKA81LK5CY"));
}

#[tokio::test]
async fn test_queue_timeout_fails_payout() {
    let h = Harness::new();
    let site = h.seed_site(None).await;
    let started = pay(&h, 10, Some(site.appliance.id)).await;

    let outcome = h
        .services
        .correlator
        .handle(CallbackKind::PayoutTimeout, &payout_result("AG_1", 1, "Request timed out"))
        .await;
    assert_eq!(outcome, DeliveryOutcome::Applied);

    let attempt = h.payouts.find_by_source(started.transaction_id).await.unwrap().unwrap();
    assert_eq!(attempt.state, PayoutState::Failed);
    assert!(attempt.failure_reason.unwrap().starts_with("queue timeout"));
}

#[tokio::test]
async fn test_disburse_failure_is_recorded_without_retry() {
    let h = Harness::new();
    let site = h.seed_site(None).await;
    h.gateway.fail_disburse.store(true, Ordering::SeqCst);

    let started = pay(&h, 10, Some(site.appliance.id)).await;

    let attempt = h.payouts.find_by_source(started.transaction_id).await.unwrap().unwrap();
    assert_eq!(attempt.state, PayoutState::Failed);
    assert!(attempt.external_reference.is_none());
    assert!(attempt.failure_reason.unwrap().contains("2001"));

    // Payment side is unaffected.
    let status = h.services.status.get_status(started.transaction_id).await.unwrap();
    assert_eq!(status.state, hotspot_billing::models::TransactionState::Completed);
}

#[tokio::test]
async fn test_early_payout_callback_is_replayed() {
    let h = Harness::new();
    let site = h.seed_site(None).await;

    let early = h
        .services
        .correlator
        .handle(CallbackKind::PayoutResult, &payout_result("AG_1", 0, "ok"))
        .await;
    assert_eq!(early, DeliveryOutcome::Parked);

    let started = pay(&h, 10, Some(site.appliance.id)).await;

    let attempt = h.payouts.find_by_source(started.transaction_id).await.unwrap().unwrap();
    assert_eq!(attempt.state, PayoutState::Completed);
    let parked = h.deliveries.all().await;
    assert_eq!(parked[0].outcome, DeliveryOutcome::Replayed);
}

#[tokio::test]
async fn test_payout_callbacks_never_activate() {
    let h = Harness::new();
    let outcome = h
        .services
        .correlator
        .handle(CallbackKind::PayoutResult, &serde_json::to_vec(&json!({"Result": {}})).unwrap())
        .await;
    assert_eq!(outcome, DeliveryOutcome::Malformed);
    assert_eq!(h.provisioner.call_count(), 0);
}
