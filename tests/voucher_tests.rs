mod common;

use chrono::{Duration, Utc};
use common::Harness;
use hotspot_billing::error::AppError;
use hotspot_billing::models::Voucher;
use hotspot_billing::repositories::{SubjectStore, VoucherStore};
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn test_redeem_grants_plan_duration() {
    let h = Harness::new();
    let plan = h.seed_plan(dec!(50), 24, 10).await;
    h.vouchers.insert(Voucher::new("WIFI-2024", plan.id)).await;

    let redemption = h.services.vouchers.redeem("WIFI-2024", "session-1").await.unwrap();

    assert_eq!(redemption.plan.id, plan.id);
    let expected = Utc::now() + Duration::hours(24);
    assert!((redemption.active_until - expected).num_seconds().abs() < 5);

    let subject = h.subjects.find_by_handle("session-1").await.unwrap().unwrap();
    assert_eq!(subject.active_until, Some(redemption.active_until));

    let voucher = h.vouchers.find("WIFI-2024").await.unwrap().unwrap();
    assert_eq!(voucher.used_by, Some(subject.id));
    assert!(voucher.used_at.is_some());

    // Voucher activations never pay out.
    assert_eq!(h.gateway.disbursement_count(), 0);
}

#[tokio::test]
async fn test_code_is_case_insensitive() {
    let h = Harness::new();
    let plan = h.seed_plan(dec!(50), 1, 10).await;
    h.vouchers.insert(Voucher::new("abc123", plan.id)).await;

    assert!(h.services.vouchers.redeem("  Abc123 ", "session-1").await.is_ok());
}

#[tokio::test]
async fn test_second_redemption_is_rejected() {
    let h = Harness::new();
    let plan = h.seed_plan(dec!(50), 1, 10).await;
    h.vouchers.insert(Voucher::new("ONCE", plan.id)).await;

    h.services.vouchers.redeem("ONCE", "session-1").await.unwrap();
    let err = h.services.vouchers.redeem("ONCE", "session-2").await.unwrap_err();

    assert!(matches!(err, AppError::AlreadyUsed(_)));
    assert_eq!(err.status_code().as_u16(), 409);
    let other = h.subjects.find_by_handle("session-2").await.unwrap().unwrap();
    assert!(other.active_until.is_none());
}

#[tokio::test]
async fn test_concurrent_redemptions_have_one_winner() {
    let h = Arc::new(Harness::new());
    let plan = h.seed_plan(dec!(50), 1, 10).await;
    h.vouchers.insert(Voucher::new("RACE", plan.id)).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            h.services.vouchers.redeem("RACE", &format!("session-{}", i)).await
        }));
    }

    let mut won = 0;
    let mut already_used = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(AppError::AlreadyUsed(_)) => already_used += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(already_used, 9);
}

#[tokio::test]
async fn test_expired_voucher_is_rejected() {
    let h = Harness::new();
    let plan = h.seed_plan(dec!(50), 1, 10).await;
    h.vouchers
        .insert(Voucher::new("OLD", plan.id).expiring_at(Utc::now() - Duration::days(1)))
        .await;

    let err = h.services.vouchers.redeem("OLD", "session-1").await.unwrap_err();

    assert!(matches!(err, AppError::Expired(_)));
    let voucher = h.vouchers.find("OLD").await.unwrap().unwrap();
    assert!(voucher.used_by.is_none());
}

#[tokio::test]
async fn test_used_voucher_past_expiry_reports_already_used() {
    let h = Harness::new();
    let plan = h.seed_plan(dec!(50), 1, 10).await;
    let mut voucher = Voucher::new("SPENT", plan.id).expiring_at(Utc::now() - Duration::hours(1));
    voucher.used_by = Some(uuid::Uuid::new_v4());
    voucher.used_at = Some(Utc::now() - Duration::hours(2));
    h.vouchers.insert(voucher).await;

    let err = h.services.vouchers.redeem("SPENT", "session-1").await.unwrap_err();

    assert!(matches!(err, AppError::AlreadyUsed(_)));
}

#[tokio::test]
async fn test_unknown_and_empty_codes() {
    let h = Harness::new();

    let err = h.services.vouchers.redeem("NOPE", "session-1").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = h.services.vouchers.redeem("   ", "session-1").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h.services.vouchers.redeem("NOPE", "").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_voucher_extends_existing_grant() {
    let h = Harness::new();
    let plan = h.seed_plan(dec!(50), 2, 10).await;
    h.vouchers.insert(Voucher::new("FIRST", plan.id)).await;
    h.vouchers.insert(Voucher::new("SECOND", plan.id)).await;

    h.services.vouchers.redeem("FIRST", "session-1").await.unwrap();
    let second = h.services.vouchers.redeem("SECOND", "session-1").await.unwrap();

    let expected = Utc::now() + Duration::hours(4);
    assert!((second.active_until - expected).num_seconds().abs() < 5);
}
