use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{ErrorClass, ExternalError, PipelineError};
use crate::models::job::Stage;

/// Retry allowance for one job, shared by every stage and by the two
/// concurrent reviewers.
#[derive(Debug)]
pub struct RetryBudget {
    used: AtomicU32,
    max: u32,
}

impl RetryBudget {
    pub fn new(max: u32, already_used: u32) -> Self {
        Self {
            used: AtomicU32::new(already_used.min(max)),
            max,
        }
    }

    /// Take one retry. Returns the new cumulative count, or `None` once the
    /// budget is spent.
    pub fn try_consume(&self) -> Option<u32> {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.max).then_some(used + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

/// Bounded exponential-backoff retry around a single external call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn budget(&self) -> RetryBudget {
        RetryBudget::new(self.max_retries, 0)
    }

    /// Delay before the `attempt`-th retry (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    /// Run `call` with the default error classifier.
    pub async fn run<T, F, Fut>(
        &self,
        stage: Stage,
        budget: &RetryBudget,
        call: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExternalError>>,
    {
        self.run_classified(stage, budget, ExternalError::class, call)
            .await
    }

    /// Run `call`, retrying transient failures while the budget lasts.
    ///
    /// Non-retryable failures return immediately without touching the
    /// budget. Skip-class failures surface as [`PipelineError::Skipped`].
    pub async fn run_classified<T, F, Fut, C>(
        &self,
        stage: Stage,
        budget: &RetryBudget,
        classify: C,
        mut call: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExternalError>>,
        C: Fn(&ExternalError) -> ErrorClass,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let class = classify(&err);
            if class != ErrorClass::Transient {
                return Err(PipelineError::classified(stage, attempts, err, class));
            }

            let Some(retry_count) = budget.try_consume() else {
                tracing::warn!(
                    stage = %stage,
                    attempts,
                    error = %err,
                    "Retry budget exhausted"
                );
                return Err(PipelineError::classified(stage, attempts, err, class));
            };

            let delay = self.backoff(attempts);
            metrics::counter!("pipeline_retries_total", "stage" => <&'static str>::from(stage))
                .increment(1);
            tracing::warn!(
                stage = %stage,
                attempt = attempts,
                retry_count,
                backoff_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, retrying"
            );
            sleep(delay).await;
        }
    }
}
