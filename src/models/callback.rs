//! Webhook payloads posted by the payment processor.
//!
//! Bodies are parsed strictly into [`Callback`]; anything that does not match
//! the expected envelope becomes [`Callback::Malformed`] and is only acknowledged.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

use super::delivery::CallbackKind;

const NO_METADATA: &str = "No callback metadata received";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkEnvelope {
    body: StkBody,
}

#[derive(Debug, Deserialize)]
struct StkBody {
    #[serde(rename = "stkCallback")]
    stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(deserialize_with = "result_code")]
    result_code: i64,
    #[serde(default)]
    result_desc: String,
    callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallbackMetadata {
    #[serde(default)]
    item: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataItem {
    name: String,
    value: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultEnvelope {
    result: B2bResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct B2bResult {
    #[serde(deserialize_with = "result_code")]
    result_code: i64,
    #[serde(default)]
    result_desc: String,
    #[serde(rename = "ConversationID")]
    conversation_id: String,
    #[serde(rename = "OriginatorConversationID", default)]
    originator_conversation_id: Option<String>,
    #[serde(rename = "TransactionID", default)]
    transaction_id: Option<String>,
}

/// The processor sends ResultCode as a number for some products and a string for others.
fn result_code<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Num(i64),
        Text(String),
    }

    match Code::deserialize(deserializer)? {
        Code::Num(n) => Ok(n),
        Code::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Outcome reported for a push payment.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Succeeded {
        receipt: String,
        amount: Option<Decimal>,
        phone: Option<String>,
    },
    Failed {
        code: i64,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentResult {
    /// CheckoutRequestID.
    pub correlation_id: String,
    pub merchant_request_id: String,
    pub outcome: PaymentOutcome,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayoutOutcome {
    Succeeded { receipt: Option<String> },
    Failed { code: i64, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayoutResult {
    /// ConversationID.
    pub correlation_id: String,
    pub originator_conversation_id: Option<String>,
    pub outcome: PayoutOutcome,
    pub raw: serde_json::Value,
}

/// A parsed webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
    Payment(PaymentResult),
    Payout(PayoutResult),
    Malformed { reason: String },
}

impl Callback {
    pub fn parse(kind: CallbackKind, body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(raw) => Self::from_value(kind, raw),
            Err(e) => Callback::Malformed { reason: format!("invalid JSON: {}", e) },
        }
    }

    /// Parses an already-decoded payload, e.g. one stored on a parked delivery.
    pub fn from_value(kind: CallbackKind, raw: serde_json::Value) -> Self {
        match kind {
            CallbackKind::PaymentResult => match StkEnvelope::deserialize(&raw) {
                Ok(env) => Callback::Payment(payment_result(env.body.stk_callback, raw)),
                Err(e) => Callback::Malformed { reason: e.to_string() },
            },
            CallbackKind::PayoutResult | CallbackKind::PayoutTimeout => {
                match ResultEnvelope::deserialize(&raw) {
                    Ok(env) => Callback::Payout(payout_result(kind, env.result, raw)),
                    Err(e) => Callback::Malformed { reason: e.to_string() },
                }
            }
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Callback::Payment(p) => Some(&p.correlation_id),
            Callback::Payout(p) => Some(&p.correlation_id),
            Callback::Malformed { .. } => None,
        }
    }
}

fn payment_result(cb: StkCallback, raw: serde_json::Value) -> PaymentResult {
    let outcome = if cb.result_code != 0 {
        PaymentOutcome::Failed { code: cb.result_code, reason: cb.result_desc }
    } else {
        let items = cb.callback_metadata.map(|m| m.item).unwrap_or_default();
        match metadata_string(&items, "MpesaReceiptNumber") {
            Some(receipt) => PaymentOutcome::Succeeded {
                receipt,
                amount: metadata_decimal(&items, "Amount"),
                phone: metadata_string(&items, "PhoneNumber"),
            },
            None => PaymentOutcome::Failed { code: 0, reason: NO_METADATA.to_string() },
        }
    };

    PaymentResult {
        correlation_id: cb.checkout_request_id,
        merchant_request_id: cb.merchant_request_id,
        outcome,
        raw,
    }
}

fn payout_result(kind: CallbackKind, result: B2bResult, raw: serde_json::Value) -> PayoutResult {
    let outcome = if kind == CallbackKind::PayoutTimeout {
        PayoutOutcome::Failed {
            code: result.result_code,
            reason: format!("queue timeout: {}", result.result_desc),
        }
    } else if result.result_code == 0 {
        PayoutOutcome::Succeeded { receipt: result.transaction_id }
    } else {
        PayoutOutcome::Failed { code: result.result_code, reason: result.result_desc }
    };

    PayoutResult {
        correlation_id: result.conversation_id,
        originator_conversation_id: result.originator_conversation_id,
        outcome,
        raw,
    }
}

fn metadata_value<'a>(items: &'a [MetadataItem], name: &str) -> Option<&'a serde_json::Value> {
    items.iter().find(|i| i.name == name).and_then(|i| i.value.as_ref())
}

fn metadata_string(items: &[MetadataItem], name: &str) -> Option<String> {
    match metadata_value(items, name)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn metadata_decimal(items: &[MetadataItem], name: &str) -> Option<Decimal> {
    match metadata_value(items, name)? {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn body(v: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn test_successful_payment() {
        let payload = json!({
            "Body": {"stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {"Item": [
                    {"Name": "Amount", "Value": 10.00},
                    {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                    {"Name": "Balance"},
                    {"Name": "TransactionDate", "Value": 20191219102115u64},
                    {"Name": "PhoneNumber", "Value": 254708374149u64}
                ]}
            }}
        });

        match Callback::parse(CallbackKind::PaymentResult, &body(payload)) {
            Callback::Payment(result) => {
                assert_eq!(result.correlation_id, "ws_CO_191220191020363925");
                assert_eq!(
                    result.outcome,
                    PaymentOutcome::Succeeded {
                        receipt: "NLJ7RT61SV".into(),
                        amount: Some(dec!(10)),
                        phone: Some("254708374149".into()),
                    }
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_payment() {
        let payload = json!({
            "Body": {"stkCallback": {
                "MerchantRequestID": "m1",
                "CheckoutRequestID": "c1",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }}
        });

        let parsed = Callback::parse(CallbackKind::PaymentResult, &body(payload));
        let Callback::Payment(result) = parsed else { panic!("expected payment") };
        assert_eq!(
            result.outcome,
            PaymentOutcome::Failed { code: 1032, reason: "Request cancelled by user".into() }
        );
    }

    #[test]
    fn test_success_code_without_metadata_is_failure() {
        let payload = json!({
            "Body": {"stkCallback": {
                "MerchantRequestID": "m1",
                "CheckoutRequestID": "c1",
                "ResultCode": "0",
                "ResultDesc": "ok"
            }}
        });

        let Callback::Payment(result) = Callback::parse(CallbackKind::PaymentResult, &body(payload))
        else {
            panic!("expected payment")
        };
        assert_eq!(result.outcome, PaymentOutcome::Failed { code: 0, reason: NO_METADATA.into() });
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(matches!(
            Callback::parse(CallbackKind::PaymentResult, b"<xml/>"),
            Callback::Malformed { .. }
        ));
        assert!(matches!(
            Callback::parse(CallbackKind::PaymentResult, &body(json!({"Body": {}}))),
            Callback::Malformed { .. }
        ));
        assert!(matches!(
            Callback::parse(CallbackKind::PayoutResult, &body(json!({"Body": {}}))),
            Callback::Malformed { .. }
        ));
    }

    #[test]
    fn test_payout_result_and_timeout() {
        let payload = json!({
            "Result": {
                "ResultType": 0,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "OriginatorConversationID": "8551-61996-3",
                "ConversationID": "AG_20200120_0000417fed8ed666e976",
                "TransactionID": "OAK0000000"
            }
        });

        let Callback::Payout(result) = Callback::parse(CallbackKind::PayoutResult, &body(payload.clone()))
        else {
            panic!("expected payout")
        };
        assert_eq!(result.correlation_id, "AG_20200120_0000417fed8ed666e976");
        assert_eq!(result.outcome, PayoutOutcome::Succeeded { receipt: Some("OAK0000000".into()) });

        let Callback::Payout(timeout) = Callback::parse(CallbackKind::PayoutTimeout, &body(payload))
        else {
            panic!("expected payout")
        };
        assert!(matches!(timeout.outcome, PayoutOutcome::Failed { .. }));
    }
}
