use chrono::Utc;
use garde::Validate;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use uuid::Uuid;

use crate::models::batch::{BatchRequest, BatchResult, BatchRow, BatchSummary, RowResult};
use crate::models::job::{Job, JobStatus};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::engine::PipelineEngine;
use crate::pipeline::registry::JobRegistry;

/// A row with its job id reserved. The job itself is created on admission.
#[derive(Debug, Clone)]
pub struct PlannedJob {
    pub job_id: Uuid,
    pub row: BatchRow,
}

/// A batch whose job ids are reserved but whose rows have not run.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub batch_id: Uuid,
    pub rows: Vec<PlannedJob>,
    pub concurrency: usize,
    pub dry_run: bool,
}

/// Handle to a batch running in the background.
pub struct BatchTask {
    pub batch_id: Uuid,
    handle: JoinHandle<BatchResult>,
}

impl BatchTask {
    /// Stop the batch and every job it has admitted.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) -> Result<BatchResult, JoinError> {
        self.handle.await
    }
}

/// Held by a running batch. On drop, whether the batch settled or was
/// cancelled, aborts any admitted job still running and releases the
/// batch from the registry.
struct BatchGuard {
    registry: Arc<JobRegistry>,
    batch_id: Uuid,
    admitted: Vec<AbortHandle>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        for handle in &self.admitted {
            handle.abort();
        }
        self.registry.release_batch(self.batch_id);
    }
}

/// Fans rows out to pipeline engines under a concurrency cap.
#[derive(Clone)]
pub struct BatchOrchestrator {
    ctx: Arc<PipelineContext>,
    engine: PipelineEngine,
}

impl BatchOrchestrator {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let engine = PipelineEngine::new(ctx.clone());
        Self { ctx, engine }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    /// Run a batch to completion.
    pub async fn submit_batch(&self, request: BatchRequest) -> BatchResult {
        let prepared = self.prepare(request);
        self.run(prepared).await
    }

    /// Latest snapshot of an admitted job whose batch has not settled yet.
    pub fn job_status(&self, job_id: Uuid) -> Option<Job> {
        self.ctx.registry.get(job_id)
    }

    /// Reserve a job id per row. Jobs are created only when admitted.
    pub fn prepare(&self, request: BatchRequest) -> PreparedBatch {
        let batch_id = Uuid::new_v4();
        let concurrency = request
            .concurrency
            .unwrap_or(self.ctx.settings.batch_concurrency)
            .max(1);
        let dry_run = request.dry_run.unwrap_or(self.ctx.settings.dry_run);

        let rows: Vec<PlannedJob> = request
            .rows
            .into_iter()
            .map(|row| PlannedJob {
                job_id: Uuid::new_v4(),
                row,
            })
            .collect();

        metrics::counter!("pipeline_batches_total").increment(1);
        tracing::info!(
            batch_id = %batch_id,
            rows = rows.len(),
            concurrency,
            dry_run,
            "Batch prepared"
        );

        PreparedBatch {
            batch_id,
            rows,
            concurrency,
            dry_run,
        }
    }

    /// A row that fails validation becomes a job failed on creation. It is
    /// never admitted and takes no slot.
    fn reject_invalid(&self, batch_id: Uuid, planned: &PlannedJob) -> Option<Job> {
        let report = planned.row.validate().err()?;
        let mut job = Job::from_row(planned.job_id, batch_id, &planned.row);
        let error = format!("invalid row: {}", report.to_string().trim());
        tracing::warn!(job_id = %job.id, source_ref = %planned.row.source_ref, error = %error, "Rejected row");
        if let Err(invalid) = job.transition(JobStatus::Failed { stage: None, error }) {
            tracing::error!(job_id = %job.id, error = %invalid, "Could not fail rejected row");
        }
        self.ctx.registry.upsert(&job);
        Some(job)
    }

    /// Run a prepared batch in the background.
    pub fn spawn_batch(&self, prepared: PreparedBatch) -> BatchTask {
        let batch_id = prepared.batch_id;
        let orchestrator = self.clone();
        let handle = tokio::spawn(async move { orchestrator.run(prepared).await });
        BatchTask { batch_id, handle }
    }

    /// Admit jobs in row order, at most `concurrency` at a time, and wait
    /// for every one of them to settle.
    pub async fn run(&self, prepared: PreparedBatch) -> BatchResult {
        let started_at = Utc::now();
        let PreparedBatch {
            batch_id,
            rows,
            concurrency,
            dry_run,
        } = prepared;

        self.ctx.registry.open_batch(batch_id);
        let mut guard = BatchGuard {
            registry: self.ctx.registry.clone(),
            batch_id,
            admitted: Vec::new(),
        };

        let slots = Arc::new(Semaphore::new(concurrency));
        let mut pending: Vec<Pending> = Vec::with_capacity(rows.len());

        for planned in rows {
            if let Some(rejected) = self.reject_invalid(batch_id, &planned) {
                pending.push(Pending::Settled(rejected));
                continue;
            }

            let permit = slots.clone().acquire_owned().await;
            let job = Job::from_row(planned.job_id, batch_id, &planned.row);
            let Ok(permit) = permit else {
                pending.push(Pending::Settled(self.force_fail(job, "admission closed")));
                continue;
            };

            self.ctx.registry.upsert(&job);
            let engine = self.engine.clone();
            let fallback = job.clone();
            let handle = tokio::spawn(async move {
                let job = engine.run(job, dry_run).await;
                drop(permit);
                job
            });
            guard.admitted.push(handle.abort_handle());
            pending.push(Pending::Running { handle, fallback });
        }

        let mut settled = Vec::with_capacity(pending.len());
        for slot in pending {
            let job = match slot {
                Pending::Settled(job) => job,
                Pending::Running { handle, fallback } => match handle.await {
                    Ok(job) => job,
                    Err(err) => self.recover(fallback, err),
                },
            };
            settled.push(job);
        }
        drop(guard);

        let summary = BatchSummary::from_jobs(&settled);
        let rows = settled.iter().map(RowResult::from).collect();

        tracing::info!(
            batch_id = %batch_id,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "Batch settled"
        );

        BatchResult {
            batch_id,
            dry_run,
            rows,
            summary,
            jobs: settled,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// A job task panicked or was aborted: fail it from its last snapshot.
    fn recover(&self, fallback: Job, err: JoinError) -> Job {
        let job = self.ctx.registry.get(fallback.id).unwrap_or(fallback);
        if job.is_terminal() {
            return job;
        }
        let reason = if err.is_cancelled() {
            "job task was cancelled".to_string()
        } else {
            format!("job task panicked: {err}")
        };
        self.force_fail(job, &reason)
    }

    fn force_fail(&self, mut job: Job, reason: &str) -> Job {
        tracing::error!(job_id = %job.id, reason, "Forcing job to failed");
        let stage = job.status.stage();
        if job
            .transition(JobStatus::Failed {
                stage,
                error: reason.to_string(),
            })
            .is_ok()
        {
            self.ctx.registry.upsert(&job);
        }
        job
    }
}

enum Pending {
    Settled(Job),
    Running {
        handle: JoinHandle<Job>,
        fallback: Job,
    },
}
