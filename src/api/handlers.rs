use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::requests::{ActivateRequest, RedeemRequest};
use crate::api::responses::{
    ApiResponse, ErrorResponse, HealthResponse, PlanResponse, RedeemResponse, ValidationErrorDetail,
    WebhookAck,
};
use crate::error::AppError;
use crate::models::CallbackKind;
use crate::observability::{AggregatedHealth, HealthStatus};
use crate::services::{ActivationRequest, CheckoutStarted, TransactionStatus};

use super::routes::AppState;

type ApiError = (StatusCode, Json<ApiResponse<()>>);

/// Maps a service error onto the public error envelope. 500s carry no detail.
fn error_response(context: &str, error: AppError) -> ApiError {
    let status = error.status_code();
    if !error.is_client_visible() {
        tracing::error!("{}: {}", context, error);
        return (
            status,
            Json(ApiResponse::<()>::error(ErrorResponse::new(
                "INTERNAL_ERROR",
                "An internal error occurred",
            ))),
        );
    }

    tracing::debug!("{}: {}", context, error);
    let message = match &error {
        AppError::Validation(msg) | AppError::NotFound(msg) => msg.clone(),
        other => other.to_string(),
    };
    (status, Json(ApiResponse::<()>::error(ErrorResponse::new(error.code(), message))))
}

fn validation_failed(errors: validator::ValidationErrors) -> ApiError {
    let mut details: Vec<ValidationErrorDetail> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| ValidationErrorDetail {
                field: field.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field)),
            })
        })
        .collect();
    details.sort_by(|a, b| a.field.cmp(&b.field));

    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(
            ErrorResponse::new("VALIDATION_ERROR", "Request validation failed").with_details(details),
        )),
    )
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let status = match &state.health_checker {
        Some(checker) => checker.check_all().await.status,
        None => HealthStatus::Healthy,
    };

    let response = HealthResponse {
        status: match status {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
        .to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    };

    Json(ApiResponse::success(response))
}

/// Per-dependency health report.
pub async fn detailed_health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AggregatedHealth>>, ApiError> {
    match &state.health_checker {
        Some(checker) => Ok(Json(ApiResponse::success(checker.check_all().await))),
        None => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<()>::error(ErrorResponse::new(
                "HEALTH_UNAVAILABLE",
                "Health checker is not configured",
            ))),
        )),
    }
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    let ready = match &state.health_checker {
        Some(checker) => checker.is_ready().await,
        None => true,
    };

    if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

// ============================================================================
// Activation Handlers
// ============================================================================

/// Plans on sale, for the captive portal.
pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<PlanResponse>>, ApiError> {
    state
        .services
        .checkout
        .active_plans()
        .await
        .map(|plans| Json(plans.into_iter().map(PlanResponse::from).collect()))
        .map_err(|e| error_response("Failed to list plans", e))
}

/// Start a paid activation with a push payment to the subscriber's phone.
pub async fn activate(
    State(state): State<AppState>,
    Json(request): Json<ActivateRequest>,
) -> Result<(StatusCode, Json<CheckoutStarted>), ApiError> {
    if let Err(errors) = request.validate() {
        return Err(validation_failed(errors));
    }

    let service_request = ActivationRequest {
        phone: request.phone,
        plan_id: request.plan_id,
        subject_handle: request.subject_id,
        appliance_id: request.appliance_id,
    };

    match state.services.checkout.request_activation(service_request).await {
        Ok(started) => Ok((StatusCode::CREATED, Json(started))),
        Err(e) => Err(error_response("Failed to start activation", e)),
    }
}

/// Poll the state of a transaction.
pub async fn activation_status(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionStatus>, ApiError> {
    state
        .services
        .status
        .get_status(transaction_id)
        .await
        .map(Json)
        .map_err(|e| error_response("Failed to read transaction status", e))
}

/// Redeem a prepaid voucher.
pub async fn redeem_voucher(
    State(state): State<AppState>,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, ApiError> {
    if let Err(errors) = request.validate() {
        return Err(validation_failed(errors));
    }

    state
        .services
        .vouchers
        .redeem(&request.voucher_code, &request.subject_id)
        .await
        .map(|redemption| Json(RedeemResponse::from(redemption)))
        .map_err(|e| error_response("Failed to redeem voucher", e))
}

// ============================================================================
// Webhook Handlers
// ============================================================================

async fn acknowledge(state: &AppState, kind: CallbackKind, body: Bytes) -> Json<WebhookAck> {
    let outcome = state.services.correlator.handle(kind, &body).await;
    tracing::debug!(kind = kind.as_str(), outcome = outcome.as_str(), "Webhook acknowledged");
    Json(WebhookAck::default())
}

/// Push-payment result from the processor.
pub async fn payment_result_webhook(State(state): State<AppState>, body: Bytes) -> Json<WebhookAck> {
    acknowledge(&state, CallbackKind::PaymentResult, body).await
}

/// Disbursement result from the processor.
pub async fn payout_result_webhook(State(state): State<AppState>, body: Bytes) -> Json<WebhookAck> {
    acknowledge(&state, CallbackKind::PayoutResult, body).await
}

/// Disbursement queue timeout from the processor.
pub async fn payout_timeout_webhook(State(state): State<AppState>, body: Bytes) -> Json<WebhookAck> {
    acknowledge(&state, CallbackKind::PayoutTimeout, body).await
}
