use std::future::Future;
use std::time::Duration;

use crate::error::Result;
use crate::observability::{get_metrics, LatencyTimer};

/// Result of a side effect that must never fail the activation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectOutcome {
    Succeeded,
    Skipped(String),
    Failed(String),
    TimedOut,
}

impl EffectOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectOutcome::Succeeded => "succeeded",
            EffectOutcome::Skipped(_) => "skipped",
            EffectOutcome::Failed(_) => "failed",
            EffectOutcome::TimedOut => "timed_out",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EffectOutcome::Succeeded)
    }
}

/// Runs `effect` under `budget`, logging and counting the outcome.
///
/// Errors and timeouts are absorbed into the returned [`EffectOutcome`].
pub async fn best_effort<F>(name: &str, budget: Duration, effect: F) -> EffectOutcome
where
    F: Future<Output = Result<EffectOutcome>>,
{
    let timer = LatencyTimer::new();

    let outcome = match tokio::time::timeout(budget, effect).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => EffectOutcome::Failed(e.to_string()),
        Err(_) => EffectOutcome::TimedOut,
    };

    match &outcome {
        EffectOutcome::Succeeded => tracing::info!(effect = name, "Side effect succeeded"),
        EffectOutcome::Skipped(reason) => {
            tracing::info!(effect = name, reason = %reason, "Side effect skipped")
        }
        EffectOutcome::Failed(reason) => {
            tracing::error!(effect = name, reason = %reason, "Side effect failed")
        }
        EffectOutcome::TimedOut => tracing::error!(
            effect = name,
            budget_ms = budget.as_millis() as u64,
            "Side effect timed out"
        ),
    }
    get_metrics().record_side_effect(name, outcome.as_str(), timer.elapsed_ms());

    outcome
}
