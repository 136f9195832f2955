use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// Which webhook a delivery came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    PaymentResult,
    PayoutResult,
    PayoutTimeout,
}

impl CallbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackKind::PaymentResult => "payment_result",
            CallbackKind::PayoutResult => "payout_result",
            CallbackKind::PayoutTimeout => "payout_timeout",
        }
    }
}

/// What the correlator did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Drove a state transition.
    Applied,
    /// Target already terminal, nothing changed.
    Duplicate,
    /// No matching row yet. Replayed once the row exists.
    Parked,
    /// A parked delivery that has since been processed.
    Replayed,
    /// Unparseable body.
    Malformed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Applied => "applied",
            DeliveryOutcome::Duplicate => "duplicate",
            DeliveryOutcome::Parked => "parked",
            DeliveryOutcome::Replayed => "replayed",
            DeliveryOutcome::Malformed => "malformed",
        }
    }
}

/// Append-only audit record of one webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CallbackDelivery {
    pub id: Uuid,
    pub kind: CallbackKind,
    pub correlation_id: Option<String>,
    /// SHA-256 of the raw body, hex encoded.
    pub payload_hash: String,
    pub payload: Option<serde_json::Value>,
    pub outcome: DeliveryOutcome,
    pub received_at: DateTime<Utc>,
}

impl CallbackDelivery {
    pub fn new(kind: CallbackKind, raw: &[u8], outcome: DeliveryOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            correlation_id: None,
            payload_hash: payload_hash(raw),
            payload: serde_json::from_slice(raw).ok(),
            outcome,
            received_at: Utc::now(),
        }
    }

    pub fn correlated(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

pub fn payload_hash(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_hash_is_stable() {
        let a = payload_hash(b"{\"a\":1}");
        assert_eq!(a.len(), 64);
        assert_eq!(a, payload_hash(b"{\"a\":1}"));
        assert_ne!(a, payload_hash(b"{\"a\":2}"));
    }

    #[test]
    fn test_unparseable_payload_kept_as_hash_only() {
        let delivery = CallbackDelivery::new(CallbackKind::PaymentResult, b"not json", DeliveryOutcome::Malformed);
        assert!(delivery.payload.is_none());
        assert!(delivery.correlation_id.is_none());
        assert_eq!(delivery.payload_hash.len(), 64);
    }
}
