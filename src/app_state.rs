use sqlx::PgPool;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::config::{AppConfig, PolicyConfig};
use crate::db::records::PgRecordSync;
use crate::models::asset::Targeting;
use crate::models::batch::BatchResult;
use crate::models::job::Job;
use crate::pipeline::{BatchOrchestrator, BatchTask, Collaborators, PipelineContext, PreparedBatch};
use crate::services::{
    analyzer::LlmMediaAnalyzer,
    copywriter::LlmCopyGenerator,
    llm::{LlmClient, LlmError},
    publisher::GraphAdsPublisher,
    resolver::HttpAssetResolver,
    reviewers::{LlmComplianceReviewer, LlmDomainReviewer},
    reviser::LlmReviser,
    storage::{R2AssetStore, StorageError},
};

/// Batches the server knows about: the ones still running, and the most
/// recent settled results up to a fixed capacity.
#[derive(Debug, Default)]
struct BatchBook {
    running: HashSet<Uuid>,
    settled: HashMap<Uuid, BatchResult>,
    /// Settled batch ids, oldest first.
    order: VecDeque<Uuid>,
    /// Every job id the book can answer for, mapped to its batch.
    job_batches: HashMap<Uuid, Uuid>,
    capacity: usize,
}

impl BatchBook {
    fn forget(&mut self, batch_id: Uuid) {
        self.running.remove(&batch_id);
        match self.settled.remove(&batch_id) {
            Some(result) => {
                for job in &result.jobs {
                    self.job_batches.remove(&job.id);
                }
            }
            None => self.job_batches.retain(|_, batch| *batch != batch_id),
        }
    }

    fn settle(&mut self, result: BatchResult) {
        let batch_id = result.batch_id;
        self.running.remove(&batch_id);
        self.settled.insert(batch_id, result);
        self.order.push_back(batch_id);

        while self.order.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            tracing::debug!(batch_id = %oldest, "Evicting settled batch");
            self.forget(oldest);
        }
    }
}

/// What the server knows about a job id.
#[derive(Debug, Clone)]
pub enum JobLookup {
    /// Latest snapshot, live or settled.
    Snapshot(Job),
    /// Reserved in a running batch but not admitted yet.
    Pending { batch_id: Uuid },
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: BatchOrchestrator,
    batches: Arc<RwLock<BatchBook>>,
    pub policy_loaded: bool,
}

impl AppState {
    /// `settled_capacity` bounds how many settled batch results are kept for
    /// lookups; older ones are evicted first.
    pub fn new(orchestrator: BatchOrchestrator, policy_loaded: bool, settled_capacity: usize) -> Self {
        Self {
            orchestrator,
            batches: Arc::new(RwLock::new(BatchBook {
                capacity: settled_capacity.max(1),
                ..BatchBook::default()
            })),
            policy_loaded,
        }
    }

    /// Remember a batch that is about to run, with its reserved job ids.
    pub fn track(&self, prepared: &PreparedBatch) {
        let mut book = self.batches.write().unwrap_or_else(|e| e.into_inner());
        book.running.insert(prepared.batch_id);
        for planned in &prepared.rows {
            book.job_batches.insert(planned.job_id, prepared.batch_id);
        }
    }

    pub fn is_running(&self, batch_id: Uuid) -> bool {
        let book = self.batches.read().unwrap_or_else(|e| e.into_inner());
        book.running.contains(&batch_id)
    }

    pub fn running_batches(&self) -> usize {
        let book = self.batches.read().unwrap_or_else(|e| e.into_inner());
        book.running.len()
    }

    pub fn settled_batches(&self) -> usize {
        let book = self.batches.read().unwrap_or_else(|e| e.into_inner());
        book.settled.len()
    }

    /// Store a settled result, evicting the oldest beyond capacity.
    pub fn settle(&self, result: BatchResult) {
        let mut book = self.batches.write().unwrap_or_else(|e| e.into_inner());
        book.settle(result);
    }

    pub fn batch_result(&self, batch_id: Uuid) -> Option<BatchResult> {
        let book = self.batches.read().unwrap_or_else(|e| e.into_inner());
        book.settled.get(&batch_id).cloned()
    }

    /// Live snapshot from the registry, else the settled result, else
    /// pending if its batch is still running.
    pub fn job(&self, job_id: Uuid) -> Option<JobLookup> {
        if let Some(job) = self.orchestrator.job_status(job_id) {
            return Some(JobLookup::Snapshot(job));
        }
        let book = self.batches.read().unwrap_or_else(|e| e.into_inner());
        let batch_id = *book.job_batches.get(&job_id)?;
        if let Some(result) = book.settled.get(&batch_id) {
            return result.job(job_id).cloned().map(JobLookup::Snapshot);
        }
        book.running
            .contains(&batch_id)
            .then_some(JobLookup::Pending { batch_id })
    }

    /// Wait for a background batch and record its result.
    pub fn watch(&self, task: BatchTask) {
        let state = self.clone();
        tokio::spawn(async move {
            let batch_id = task.batch_id;
            match task.join().await {
                Ok(result) => state.settle(result),
                Err(err) => {
                    tracing::error!(batch_id = %batch_id, error = %err, "Batch task did not finish");
                    state
                        .batches
                        .write()
                        .unwrap_or_else(|e| e.into_inner())
                        .forget(batch_id);
                }
            }
        });
    }
}

/// Build the production collaborator set from configuration.
pub fn build_collaborators(
    config: &AppConfig,
    policy: Arc<PolicyConfig>,
    pool: PgPool,
) -> Result<Collaborators, StartupError> {
    let timeout = config.http_timeout();

    let llm = Arc::new(LlmClient::new(
        &config.llm_api_base,
        &config.llm_api_key,
        &config.llm_model,
        timeout,
    )?);

    let store = Arc::new(R2AssetStore::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )?);

    let resolver = HttpAssetResolver::new(timeout, policy.cost_guard.max_bytes)?;
    let publisher = GraphAdsPublisher::new(
        &config.ads_api_base,
        &config.ads_access_token,
        &config.ads_account_id,
        store.clone(),
        timeout,
    )?;

    Ok(Collaborators {
        resolver: Arc::new(resolver),
        store: store.clone(),
        analyzer: Arc::new(LlmMediaAnalyzer::new(llm.clone(), store, policy.clone())),
        copywriter: Arc::new(LlmCopyGenerator::new(llm.clone(), policy.clone())),
        compliance: Arc::new(LlmComplianceReviewer::new(llm.clone(), policy)),
        domain: Arc::new(LlmDomainReviewer::new(llm.clone())),
        reviser: Arc::new(LlmReviser::new(llm)),
        publisher: Arc::new(publisher),
        record_sync: Arc::new(PgRecordSync::new(pool)),
    })
}

/// Build the pipeline context the server and the CLI share.
pub fn build_context(
    config: &AppConfig,
    policy: Arc<PolicyConfig>,
    pool: PgPool,
) -> Result<PipelineContext, StartupError> {
    let targeting = Targeting {
        ad_set_id: config.ads_ad_set_id.clone(),
        page_id: config.ads_page_id.clone(),
        link_url: config.ads_link_url.clone(),
    };
    let approved_claims = policy.approved_claims.clone();
    let collaborators = build_collaborators(config, policy, pool)?;
    Ok(PipelineContext::new(
        collaborators,
        config.pipeline_settings(),
        targeting,
        approved_claims,
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
