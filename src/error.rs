use axum::http::StatusCode;
use thiserror::Error;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure or timeout talking to the payment processor.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The processor answered but refused the request.
    #[error("Payment gateway rejected request ({code}): {message}")]
    GatewayRejected { code: String, message: String },

    #[error("Payment gateway authentication failed: {0}")]
    GatewayAuthFailed(String),

    #[error("Already in a terminal state: {0}")]
    AlreadyTerminal(String),

    #[error("Voucher already used: {0}")]
    AlreadyUsed(String),

    #[error("Voucher expired: {0}")]
    Expired(String),

    #[error("Appliance provisioning failed: {0}")]
    ProvisioningFailed(String),

    #[error("Payout failed: {0}")]
    PayoutFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status returned to API callers.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::GatewayUnavailable(_)
            | AppError::GatewayRejected { .. }
            | AppError::GatewayAuthFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::AlreadyTerminal(_) | AppError::AlreadyUsed(_) => StatusCode::CONFLICT,
            AppError::Expired(_) => StatusCode::GONE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            AppError::GatewayRejected { .. } => "GATEWAY_REJECTED",
            AppError::GatewayAuthFailed(_) => "GATEWAY_AUTH_FAILED",
            AppError::AlreadyTerminal(_) => "ALREADY_TERMINAL",
            AppError::AlreadyUsed(_) => "VOUCHER_ALREADY_USED",
            AppError::Expired(_) => "VOUCHER_EXPIRED",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Whether the message is safe to show to API callers.
    pub fn is_client_visible(&self) -> bool {
        self.status_code() != StatusCode::INTERNAL_SERVER_ERROR
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Expired("x".into()).status_code(), StatusCode::GONE);
        assert_eq!(
            AppError::GatewayRejected { code: "1".into(), message: "no".into() }.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::ProvisioningFailed("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_errors_are_hidden() {
        assert!(!AppError::PayoutFailed("x".into()).is_client_visible());
        assert!(AppError::AlreadyUsed("x".into()).is_client_visible());
        assert_eq!(AppError::AlreadyUsed("x".into()).code(), "VOUCHER_ALREADY_USED");
    }
}
