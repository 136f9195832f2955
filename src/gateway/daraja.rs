//! M-Pesa Daraja client: OAuth token, STK push, STK query and B2B disbursement.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{
    validate_amount, DisbursementAccepted, DisbursementRequest, PaymentGateway, PushAccepted,
    PushRequest, PushStatus,
};
use crate::config::GatewaySettings;
use crate::error::{AppError, Result};
use crate::observability::{get_metrics, mask_phone, LatencyTimer};

const TOKEN_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const STK_QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";
const B2B_PATH: &str = "/mpesa/b2b/v1/paymentrequest";

/// The processor stamps requests in East Africa Time.
const PROCESSOR_UTC_OFFSET_HOURS: i64 = 3;

struct CachedToken {
    value: SecretString,
    expires_at: Instant,
}

pub struct DarajaClient {
    http: reqwest::Client,
    settings: GatewaySettings,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(deserialize_with = "lenient_u64")]
    expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'static str,
    amount: u64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: String,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    response_code: String,
    #[serde(default)]
    response_description: String,
    #[serde(default)]
    customer_message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryResponse {
    #[serde(default)]
    result_code: Option<serde_json::Value>,
    #[serde(default)]
    result_desc: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct B2bBody<'a> {
    initiator: &'a str,
    security_credential: &'a str,
    #[serde(rename = "CommandID")]
    command_id: &'static str,
    sender_identifier_type: &'static str,
    // Field name as spelled by the processor.
    reciever_identifier_type: &'static str,
    amount: u64,
    party_a: &'a str,
    party_b: &'a str,
    account_reference: &'a str,
    remarks: &'a str,
    #[serde(rename = "QueueTimeOutURL")]
    queue_timeout_url: String,
    #[serde(rename = "ResultURL")]
    result_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct B2bResponse {
    #[serde(rename = "OriginatorConversationID")]
    originator_conversation_id: String,
    #[serde(rename = "ConversationID")]
    conversation_id: String,
    response_code: String,
    #[serde(default)]
    response_description: String,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    error_message: String,
}

fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl DarajaClient {
    pub fn new(settings: GatewaySettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            settings,
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn callback_url(&self, path: &str) -> String {
        format!("{}{}", self.settings.callback_base_url.trim_end_matches('/'), path)
    }

    /// `YYYYMMDDHHMMSS` in processor local time.
    fn timestamp() -> String {
        (Utc::now() + ChronoDuration::hours(PROCESSOR_UTC_OFFSET_HOURS))
            .format("%Y%m%d%H%M%S")
            .to_string()
    }

    fn password(&self, timestamp: &str) -> String {
        password_for(&self.settings.short_code, self.settings.passkey.expose_secret(), timestamp)
    }

    /// Returns a bearer token, refreshing it once it is within the safety margin of expiry.
    async fn access_token(&self) -> Result<String> {
        let margin = self.settings.token_margin();
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if Instant::now() + margin < token.expires_at {
                    return Ok(token.value.expose_secret().to_string());
                }
            }
        }

        let mut cached = self.token.write().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + margin < token.expires_at {
                return Ok(token.value.expose_secret().to_string());
            }
        }
        // A failed refresh must not leave the stale token usable.
        *cached = None;

        let timer = LatencyTimer::new();
        let response = self
            .http
            .get(self.url(TOKEN_PATH))
            .basic_auth(
                self.settings.consumer_key.expose_secret(),
                Some(self.settings.consumer_secret.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| AppError::GatewayAuthFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            get_metrics().record_gateway_call("authenticate", false, timer.elapsed_ms());
            return Err(AppError::GatewayAuthFailed(format!("token endpoint returned {}", status)));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::GatewayAuthFailed(format!("invalid token response: {}", e)))?;
        get_metrics().record_gateway_call("authenticate", true, timer.elapsed_ms());

        let value = body.access_token.clone();
        *cached = Some(CachedToken {
            value: SecretString::from(body.access_token),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        tracing::debug!(expires_in = body.expires_in, "Refreshed gateway access token");

        Ok(value)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let token = self.access_token().await?;
        let timer = LatencyTimer::new();

        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                get_metrics().record_gateway_call(operation, false, timer.elapsed_ms());
                if e.is_timeout() {
                    AppError::GatewayUnavailable(format!("{} timed out", operation))
                } else {
                    AppError::GatewayUnavailable(format!("{} failed: {}", operation, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            get_metrics().record_gateway_call(operation, false, timer.elapsed_ms());
            if status.is_server_error() && status != reqwest::StatusCode::INTERNAL_SERVER_ERROR {
                return Err(AppError::GatewayUnavailable(format!("{} returned {}", operation, status)));
            }
            let error: ErrorBody = response.json().await.unwrap_or_default();
            return Err(AppError::GatewayRejected {
                code: if error.error_code.is_empty() { status.as_u16().to_string() } else { error.error_code },
                message: if error.error_message.is_empty() { status.to_string() } else { error.error_message },
            });
        }

        let parsed = response.json::<R>().await.map_err(|e| {
            AppError::GatewayUnavailable(format!("{} returned an unreadable body: {}", operation, e))
        });
        get_metrics().record_gateway_call(operation, parsed.is_ok(), timer.elapsed_ms());
        parsed
    }

    fn whole_units(&self, amount: Decimal) -> Result<u64> {
        validate_amount(amount, self.settings.max_amount)?;
        amount
            .to_u64()
            .ok_or_else(|| AppError::Validation(format!("amount {} is out of range", amount)))
    }
}

#[async_trait]
impl PaymentGateway for DarajaClient {
    async fn initiate(&self, request: &PushRequest) -> Result<PushAccepted> {
        let amount = self.whole_units(request.amount)?;
        let timestamp = Self::timestamp();
        let body = StkPushBody {
            business_short_code: &self.settings.short_code,
            password: self.password(&timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount,
            party_a: request.phone.as_str(),
            party_b: &self.settings.short_code,
            phone_number: request.phone.as_str(),
            callback_url: self.callback_url("/webhook/payment-result"),
            account_reference: &request.account_reference,
            transaction_desc: &request.description,
        };

        tracing::info!(
            phone = %mask_phone(request.phone.as_str()),
            amount,
            "Initiating push payment"
        );

        let response: StkPushResponse = self.post("initiate", STK_PUSH_PATH, &body).await?;
        if response.response_code != "0" {
            return Err(AppError::GatewayRejected {
                code: response.response_code,
                message: response.response_description,
            });
        }

        Ok(PushAccepted {
            correlation_id: response.checkout_request_id,
            merchant_request_id: response.merchant_request_id,
            customer_message: response.customer_message,
        })
    }

    async fn query_status(&self, correlation_id: &str) -> Result<PushStatus> {
        let timestamp = Self::timestamp();
        let body = StkQueryBody {
            business_short_code: &self.settings.short_code,
            password: self.password(&timestamp),
            timestamp,
            checkout_request_id: correlation_id,
        };

        let response: StkQueryResponse = self.post("query_status", STK_QUERY_PATH, &body).await?;
        let result_code = match response.result_code {
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };

        Ok(PushStatus {
            result_code,
            result_desc: response.result_desc,
        })
    }

    async fn disburse(&self, request: &DisbursementRequest) -> Result<DisbursementAccepted> {
        let amount = self.whole_units(request.amount)?;
        let body = B2bBody {
            initiator: &self.settings.initiator,
            security_credential: self.settings.security_credential.expose_secret(),
            command_id: "BusinessPayBill",
            sender_identifier_type: "4",
            reciever_identifier_type: "4",
            amount,
            party_a: &self.settings.disbursement_short_code,
            party_b: &request.paybill,
            account_reference: &request.account_reference,
            remarks: &request.remarks,
            queue_timeout_url: self.callback_url("/webhook/payout-timeout"),
            result_url: self.callback_url("/webhook/payout-result"),
        };

        let response: B2bResponse = self.post("disburse", B2B_PATH, &body).await?;
        if response.response_code != "0" {
            return Err(AppError::GatewayRejected {
                code: response.response_code,
                message: response.response_description,
            });
        }

        Ok(DisbursementAccepted {
            conversation_id: response.conversation_id,
            originator_conversation_id: response.originator_conversation_id,
        })
    }
}

/// `base64(short_code + passkey + timestamp)`.
pub fn password_for(short_code: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", short_code, passkey, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_encoding() {
        assert_eq!(password_for("174379", "key", "20240101120000"), STANDARD.encode("174379key20240101120000"));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = DarajaClient::timestamp();
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_token_expiry_accepts_string() {
        let body: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":"3599"}"#).unwrap();
        assert_eq!(body.expires_in, 3599);
    }
}
