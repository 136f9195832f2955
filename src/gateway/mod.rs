pub mod daraja;
pub mod msisdn;

pub use daraja::DarajaClient;
pub use msisdn::Msisdn;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::{AppError, Result};

/// A push payment to request from the subscriber's handset.
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub phone: Msisdn,
    pub amount: Decimal,
    pub account_reference: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushAccepted {
    /// CheckoutRequestID, echoed back on the payment-result webhook.
    pub correlation_id: String,
    pub merchant_request_id: String,
    pub customer_message: String,
}

/// Processor view of a push payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PushStatus {
    pub result_code: Option<i64>,
    pub result_desc: String,
}

#[derive(Debug, Clone)]
pub struct DisbursementRequest {
    pub amount: Decimal,
    pub paybill: String,
    pub account_reference: String,
    pub remarks: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisbursementAccepted {
    /// ConversationID, echoed back on the payout webhooks.
    pub conversation_id: String,
    pub originator_conversation_id: String,
}

/// Outbound calls to the push-payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(&self, request: &PushRequest) -> Result<PushAccepted>;

    async fn query_status(&self, correlation_id: &str) -> Result<PushStatus>;

    async fn disburse(&self, request: &DisbursementRequest) -> Result<DisbursementAccepted>;
}

/// Rejects amounts the processor would refuse: non-positive, fractional, or above `ceiling`.
pub fn validate_amount(amount: Decimal, ceiling: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }
    if amount.fract() != Decimal::ZERO {
        return Err(AppError::Validation("amount must be a whole number".to_string()));
    }
    if amount > ceiling {
        return Err(AppError::Validation(format!("amount exceeds the maximum of {}", ceiling)));
    }
    Ok(())
}
