use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Status of a beneficiary disbursement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PayoutState {
    Initiated,
    Completed,
    Failed,
}

impl PayoutState {
    pub fn is_final(&self) -> bool {
        matches!(self, PayoutState::Completed | PayoutState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutState::Initiated => "initiated",
            PayoutState::Completed => "completed",
            PayoutState::Failed => "failed",
        }
    }
}

/// Resolution of a payout, from the processor or from a local disburse failure.
#[derive(Debug, Clone, PartialEq)]
pub enum PayoutResolution {
    Complete {
        receipt: Option<String>,
        metadata: serde_json::Value,
    },
    Fail {
        reason: String,
        metadata: Option<serde_json::Value>,
    },
}

impl PayoutResolution {
    pub fn target_state(&self) -> PayoutState {
        match self {
            PayoutResolution::Complete { .. } => PayoutState::Completed,
            PayoutResolution::Fail { .. } => PayoutState::Failed,
        }
    }
}

/// At most one per source transaction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayoutAttempt {
    pub id: Uuid,
    pub source_transaction_id: Uuid,
    pub tenant_id: Uuid,
    pub target_id: Uuid,
    pub beneficiary_share: Decimal,
    pub state: PayoutState,
    /// Processor ConversationID, the payout callback correlation key.
    pub external_reference: Option<String>,
    pub external_receipt: Option<String>,
    pub failure_reason: Option<String>,
    pub result_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PayoutAttempt {
    pub fn initiated(
        source_transaction_id: Uuid,
        tenant_id: Uuid,
        target_id: Uuid,
        beneficiary_share: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_transaction_id,
            tenant_id,
            target_id,
            beneficiary_share,
            state: PayoutState::Initiated,
            external_reference: None,
            external_receipt: None,
            failure_reason: None,
            result_metadata: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Applies a resolution if the attempt is still open. Returns false otherwise.
    pub fn apply(&mut self, resolution: &PayoutResolution) -> bool {
        if self.state.is_final() {
            return false;
        }
        self.state = resolution.target_state();
        match resolution {
            PayoutResolution::Complete { receipt, metadata } => {
                self.external_receipt = receipt.clone();
                self.result_metadata = Some(metadata.clone());
            }
            PayoutResolution::Fail { reason, metadata } => {
                self.failure_reason = Some(reason.clone());
                self.result_metadata = metadata.clone();
            }
        }
        self.resolved_at = Some(Utc::now());
        true
    }
}

/// Beneficiary share of a payment, floored to whole currency units.
pub fn beneficiary_share(amount: Decimal, share_percent: Decimal) -> Decimal {
    let pct = share_percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
    (amount * pct / Decimal::ONE_HUNDRED).round_dp_with_strategy(0, RoundingStrategy::ToNegativeInfinity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_share_is_floored() {
        assert_eq!(beneficiary_share(dec!(10), dec!(80)), dec!(8));
        assert_eq!(beneficiary_share(dec!(15), dec!(80)), dec!(12));
        assert_eq!(beneficiary_share(dec!(19), dec!(75)), dec!(14));
        assert_eq!(beneficiary_share(dec!(1), dec!(80)), dec!(0));
        assert_eq!(beneficiary_share(dec!(50), dec!(150)), dec!(50));
    }

    #[test]
    fn test_apply_only_once() {
        let mut attempt =
            PayoutAttempt::initiated(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), dec!(8));
        assert!(attempt.apply(&PayoutResolution::Complete {
            receipt: Some("RB1".into()),
            metadata: json!({})
        }));
        assert!(!attempt.apply(&PayoutResolution::Fail { reason: "late".into(), metadata: None }));
        assert_eq!(attempt.state, PayoutState::Completed);
        assert_eq!(attempt.external_receipt.as_deref(), Some("RB1"));
    }
}
