use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::TransactionState;
use crate::repositories::TransactionLedger;

/// What a polling client may see about a transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatus {
    pub state: TransactionState,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

pub struct StatusProjector {
    ledger: Arc<dyn TransactionLedger>,
}

impl StatusProjector {
    pub fn new(ledger: Arc<dyn TransactionLedger>) -> Self {
        Self { ledger }
    }

    pub async fn get_status(&self, transaction_id: Uuid) -> Result<TransactionStatus> {
        let transaction = self
            .ledger
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction with id '{}' not found", transaction_id)))?;

        Ok(TransactionStatus {
            state: transaction.state,
            amount: transaction.amount,
            created_at: transaction.created_at,
        })
    }
}
