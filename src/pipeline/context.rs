use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::PipelineSettings;
use crate::models::asset::Targeting;
use crate::pipeline::collaborators::Collaborators;
use crate::pipeline::registry::JobRegistry;
use crate::pipeline::retry::RetryPolicy;

/// Everything a pipeline run shares: collaborators, retry policy, the
/// process-wide analyzer cap and the job registry.
///
/// One context per process in production; tests build their own.
pub struct PipelineContext {
    pub collaborators: Collaborators,
    pub retry: RetryPolicy,
    /// Shared by every batch and job using this context.
    pub analyzer_permits: Arc<Semaphore>,
    pub targeting: Targeting,
    pub approved_claims: Vec<String>,
    pub registry: Arc<JobRegistry>,
    pub settings: PipelineSettings,
}

impl PipelineContext {
    pub fn new(
        collaborators: Collaborators,
        settings: PipelineSettings,
        targeting: Targeting,
        approved_claims: Vec<String>,
    ) -> Self {
        let retry = RetryPolicy {
            max_retries: settings.max_retries,
            base_backoff: settings.retry_base,
            max_backoff: settings.retry_max,
        };
        Self {
            collaborators,
            retry,
            analyzer_permits: Arc::new(Semaphore::new(settings.analyzer_concurrency.max(1))),
            targeting,
            approved_claims,
            registry: Arc::new(JobRegistry::new()),
            settings,
        }
    }
}
