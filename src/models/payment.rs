use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Lifecycle state of a push-payment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    /// Initiated, waiting for the processor.
    Pending,
    /// Processor confirmed payment.
    Completed,
    /// Processor reported failure or cancellation.
    Failed,
    /// No processor result within the local window. Still yields to a late result.
    Timeout,
}

impl TransactionState {
    /// Returns true for states no processor result can change.
    pub fn is_final(&self) -> bool {
        matches!(self, TransactionState::Completed | TransactionState::Failed)
    }

    /// Returns true if a processor result may still be applied.
    pub fn accepts_processor_result(&self) -> bool {
        matches!(self, TransactionState::Pending | TransactionState::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Pending => "pending",
            TransactionState::Completed => "completed",
            TransactionState::Failed => "failed",
            TransactionState::Timeout => "timeout",
        }
    }
}

/// Transaction state machine for managing status transitions.
#[derive(Debug, Clone)]
pub struct TransactionStateMachine;

impl TransactionStateMachine {
    pub fn valid_transitions(current: TransactionState) -> Vec<TransactionState> {
        match current {
            TransactionState::Pending => vec![
                TransactionState::Completed,
                TransactionState::Failed,
                TransactionState::Timeout,
            ],
            TransactionState::Timeout => vec![TransactionState::Completed, TransactionState::Failed],
            TransactionState::Completed => vec![],
            TransactionState::Failed => vec![],
        }
    }

    pub fn can_transition(from: TransactionState, to: TransactionState) -> bool {
        Self::valid_transitions(from).contains(&to)
    }

    pub fn transition(from: TransactionState, to: TransactionState) -> Result<TransactionState> {
        if Self::can_transition(from, to) {
            Ok(to)
        } else {
            Err(AppError::AlreadyTerminal(format!(
                "Invalid state transition from {:?} to {:?}",
                from, to
            )))
        }
    }
}

/// Processor-driven resolution applied to a ledger row.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Complete {
        receipt: String,
        metadata: serde_json::Value,
    },
    Fail {
        reason: String,
        metadata: serde_json::Value,
    },
}

impl Resolution {
    pub fn target_state(&self) -> TransactionState {
        match self {
            Resolution::Complete { .. } => TransactionState::Completed,
            Resolution::Fail { .. } => TransactionState::Failed,
        }
    }
}

/// One push-payment attempt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentTransaction {
    pub id: Uuid,
    /// Processor CheckoutRequestID.
    pub correlation_id: String,
    pub merchant_request_id: String,
    pub subject_id: Uuid,
    pub plan_id: Uuid,
    /// Canonical MSISDN that was charged.
    pub phone: String,
    pub amount: Decimal,
    pub state: TransactionState,
    pub external_receipt: Option<String>,
    pub failure_reason: Option<String>,
    /// Raw processor callback, kept for audit only.
    pub result_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PaymentTransaction {
    /// Creates a transaction in the pending state.
    pub fn pending(
        subject_id: Uuid,
        plan_id: Uuid,
        phone: impl Into<String>,
        amount: Decimal,
        correlation_id: impl Into<String>,
        merchant_request_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            correlation_id: correlation_id.into(),
            merchant_request_id: merchant_request_id.into(),
            subject_id,
            plan_id,
            phone: phone.into(),
            amount,
            state: TransactionState::Pending,
            external_receipt: None,
            failure_reason: None,
            result_metadata: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Applies a processor resolution in place. Used by the in-memory ledger.
    pub fn apply(&mut self, resolution: &Resolution) -> Result<()> {
        self.state = TransactionStateMachine::transition(self.state, resolution.target_state())?;
        match resolution {
            Resolution::Complete { receipt, metadata } => {
                self.external_receipt = Some(receipt.clone());
                self.result_metadata = Some(metadata.clone());
            }
            Resolution::Fail { reason, metadata } => {
                self.failure_reason = Some(reason.clone());
                self.result_metadata = Some(metadata.clone());
            }
        }
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}
