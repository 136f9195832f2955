use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::callback_correlator::CallbackCorrelator;
use crate::config::ActivationSettings;
use crate::error::{AppError, Result};
use crate::gateway::PaymentGateway;
use crate::observability::get_metrics;
use crate::repositories::TransactionLedger;

const REPLAY_BATCH: i64 = 100;

/// Declares transactions timed out when no processor result arrives in time.
///
/// Each new transaction gets its own timer; a periodic sweep catches rows
/// left pending across restarts. A timed-out row still accepts a late result.
/// The sweep first retries parked webhooks, so a result that arrived during
/// a store outage is applied instead of the row timing out.
pub struct TimeoutMonitor {
    ledger: Arc<dyn TransactionLedger>,
    gateway: Arc<dyn PaymentGateway>,
    correlator: Arc<CallbackCorrelator>,
    window: Duration,
    sweep_interval: Duration,
}

impl TimeoutMonitor {
    pub fn new(
        ledger: Arc<dyn TransactionLedger>,
        gateway: Arc<dyn PaymentGateway>,
        correlator: Arc<CallbackCorrelator>,
        settings: &ActivationSettings,
    ) -> Self {
        Self {
            ledger,
            gateway,
            correlator,
            window: settings.timeout_window(),
            sweep_interval: settings.sweep_interval(),
        }
    }

    /// Starts the local timer for one transaction.
    pub fn watch(self: &Arc<Self>, transaction_id: Uuid) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(monitor.window).await;
            if let Err(e) = monitor.expire(transaction_id).await {
                tracing::error!(transaction_id = %transaction_id, "Failed to time out transaction: {}", e);
            }
        })
    }

    /// Moves one transaction to timeout if it is still pending, then asks the
    /// processor for its view of the payment.
    pub async fn expire(&self, transaction_id: Uuid) -> Result<bool> {
        let Some(correlation_id) = self.time_out(transaction_id).await? else {
            return Ok(false);
        };

        // Diagnostic only; the processor's answer never changes local state here.
        match self.gateway.query_status(&correlation_id).await {
            Ok(status) => tracing::info!(
                transaction_id = %transaction_id,
                result_code = ?status.result_code,
                result_desc = %status.result_desc,
                "Processor status for timed-out transaction"
            ),
            Err(e) => tracing::debug!(transaction_id = %transaction_id, "Status query failed: {}", e),
        }

        Ok(true)
    }

    async fn time_out(&self, transaction_id: Uuid) -> Result<Option<String>> {
        if !self.ledger.mark_timed_out(transaction_id).await? {
            return Ok(None);
        }
        get_metrics().record_payment_timed_out();

        let correlation_id = self
            .ledger
            .find_by_id(transaction_id)
            .await?
            .map(|t| t.correlation_id)
            .unwrap_or_default();
        tracing::info!(
            transaction_id = %transaction_id,
            correlation_id = %correlation_id,
            "Transaction timed out waiting for the processor"
        );

        Ok(Some(correlation_id))
    }

    /// Replays parked webhooks, then times out every row pending longer than
    /// the window. Returns how many rows timed out. No status query is made per row.
    pub async fn run_once(&self) -> Result<u64> {
        let window = chrono::Duration::from_std(self.window)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid timeout window: {}", e)))?;

        match self.correlator.replay_all_parked(REPLAY_BATCH).await {
            Ok(0) => {}
            Ok(count) => tracing::info!("Replayed {} parked callbacks", count),
            Err(e) => tracing::warn!("Failed to replay parked callbacks: {}", e),
        }

        let mut expired = 0;
        for transaction in self.ledger.list_pending_older_than(Utc::now() - window).await? {
            if self.time_out(transaction.id).await?.is_some() {
                expired += 1;
            }
        }

        get_metrics().set_pending_transactions(self.ledger.count_pending().await?);

        Ok(expired)
    }

    /// Starts the periodic sweep in a background task.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.sweep_interval);

            loop {
                interval.tick().await;

                match self.run_once().await {
                    Ok(count) => {
                        if count > 0 {
                            tracing::info!("Timed out {} stale pending transactions", count);
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to sweep pending transactions: {}", e);
                    }
                }
            }
        })
    }
}
