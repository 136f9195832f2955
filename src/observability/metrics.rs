use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

use crate::error::{AppError, Result};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the billing pipeline.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_payment_initiated(&self, success: bool) {
        counter!("hotspot_payments_initiated_total", "success" => success.to_string()).increment(1);
    }

    pub fn record_payment_resolved(&self, state: &str) {
        counter!("hotspot_payments_resolved_total", "state" => state.to_string()).increment(1);
    }

    pub fn record_payment_timed_out(&self) {
        counter!("hotspot_payments_timed_out_total").increment(1);
    }

    pub fn record_callback(&self, kind: &str, outcome: &str) {
        counter!("hotspot_callbacks_total", "kind" => kind.to_string(), "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_activation(&self, source: &str) {
        counter!("hotspot_activations_total", "source" => source.to_string()).increment(1);
    }

    pub fn record_side_effect(&self, effect: &str, outcome: &str, duration_ms: f64) {
        counter!("hotspot_side_effects_total", "effect" => effect.to_string(), "outcome" => outcome.to_string()).increment(1);
        histogram!("hotspot_side_effect_duration_ms", "effect" => effect.to_string()).record(duration_ms);
    }

    pub fn record_payout(&self, outcome: &str) {
        counter!("hotspot_payouts_total", "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_voucher_redemption(&self, outcome: &str) {
        counter!("hotspot_voucher_redemptions_total", "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_gateway_call(&self, operation: &str, success: bool, duration_ms: f64) {
        counter!("hotspot_gateway_calls_total", "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
        histogram!("hotspot_gateway_call_duration_ms", "operation" => operation.to_string()).record(duration_ms);
    }

    pub fn set_pending_transactions(&self, count: i64) {
        gauge!("hotspot_pending_transactions").set(count as f64);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder once and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to install Prometheus recorder: {}", e)))?;
    describe_metrics();
    METRICS.get_or_init(Metrics::new);

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("hotspot_payments_initiated_total", Unit::Count, "Push payments sent to the processor");
    describe_counter!("hotspot_payments_resolved_total", Unit::Count, "Push payments resolved by processor callbacks");
    describe_counter!("hotspot_payments_timed_out_total", Unit::Count, "Push payments declared timed out locally");
    describe_gauge!("hotspot_pending_transactions", Unit::Count, "Transactions still pending at the last sweep");

    describe_counter!("hotspot_callbacks_total", Unit::Count, "Webhook deliveries by kind and outcome");
    describe_counter!("hotspot_activations_total", Unit::Count, "Access grants by source");
    describe_counter!("hotspot_side_effects_total", Unit::Count, "Best-effort side effects by outcome");
    describe_histogram!("hotspot_side_effect_duration_ms", Unit::Milliseconds, "Best-effort side effect latency in milliseconds");
    describe_counter!("hotspot_payouts_total", Unit::Count, "Beneficiary payouts by outcome");
    describe_counter!("hotspot_voucher_redemptions_total", Unit::Count, "Voucher redemptions by outcome");

    describe_counter!("hotspot_gateway_calls_total", Unit::Count, "Calls to the payment processor");
    describe_histogram!("hotspot_gateway_call_duration_ms", Unit::Milliseconds, "Payment processor latency in milliseconds");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_timer() {
        let timer = LatencyTimer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_metrics_without_recorder_are_noops() {
        let metrics = get_metrics();
        assert!(metrics.initialized);
        metrics.record_callback("payment_result", "applied");
        metrics.record_side_effect("provisioning", "failed", 1.5);
    }
}
