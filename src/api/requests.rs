use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Body of `POST /activate`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    #[validate(length(min = 1, max = 20, message = "phone must be between 1 and 20 characters"))]
    pub phone: String,
    pub plan_id: Uuid,
    /// MAC address or session handle of the device.
    #[validate(length(min = 1, max = 64, message = "subjectId cannot be empty"))]
    pub subject_id: String,
    pub appliance_id: Option<Uuid>,
}

/// Body of `POST /redeem`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    #[validate(length(min = 1, max = 32, message = "voucherCode cannot be empty"))]
    pub voucher_code: String,
    #[validate(length(min = 1, max = 64, message = "subjectId cannot be empty"))]
    pub subject_id: String,
}
