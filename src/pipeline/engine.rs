use std::sync::Arc;
use std::time::Instant;

use crate::error::{ExternalError, PipelineError};
use crate::models::asset::{AssetKey, MediaType, StagedMedia, Targeting};
use crate::models::job::{Job, JobStatus, Stage};
use crate::pipeline::collaborators::{AdRecord, AnalysisRequest, CopyBrief};
use crate::pipeline::consensus::ReviewConsensus;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::retry::RetryBudget;

/// Drives a single job through its stages, strictly in order.
#[derive(Clone)]
pub struct PipelineEngine {
    ctx: Arc<PipelineContext>,
    consensus: ReviewConsensus,
}

impl PipelineEngine {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let collaborators = &ctx.collaborators;
        let consensus = ReviewConsensus::new(
            collaborators.compliance.clone(),
            collaborators.domain.clone(),
            collaborators.reviser.clone(),
            ctx.approved_claims.clone(),
            ctx.retry.clone(),
        );
        Self { ctx, consensus }
    }

    /// Run `job` to a terminal state and return the final snapshot.
    ///
    /// Never fails: every error ends up as `failed` or `skipped` on the job.
    pub async fn run(&self, mut job: Job, dry_run: bool) -> Job {
        let started = Instant::now();
        let budget = RetryBudget::new(self.ctx.retry.max_retries, job.retry_count);

        let _active = ActiveJob::enter();
        tracing::info!(
            job_id = %job.id,
            batch_id = %job.batch_id,
            source_ref = %job.source_ref,
            dry_run,
            "Starting job"
        );

        if let Err(err) = self.drive(&mut job, &budget, dry_run).await {
            self.settle_error(&mut job, &budget, err);
        }

        metrics::histogram!("pipeline_job_duration_seconds").record(started.elapsed().as_secs_f64());
        metrics::counter!("pipeline_jobs_total", "status" => job.status.label()).increment(1);

        tracing::info!(
            job_id = %job.id,
            status = job.status.label(),
            retry_count = job.retry_count,
            copy_revised = job.copy_revised,
            duration_ms = started.elapsed().as_millis() as u64,
            error = job.error.as_deref().unwrap_or(""),
            "Job finished"
        );

        job
    }

    async fn drive(&self, job: &mut Job, budget: &RetryBudget, dry_run: bool) -> Result<(), PipelineError> {
        let media_type = job
            .media_type
            .ok_or_else(|| PipelineError::Internal("job has no valid media type".to_string()))?;

        self.advance(job, budget, JobStatus::Analyzing)?;
        self.analyze(job, budget, media_type).await?;

        self.advance(job, budget, JobStatus::WritingCopy)?;
        self.write_copy(job, budget, media_type).await?;

        self.advance(job, budget, JobStatus::ReviewingCopy)?;
        self.review_copy(job, budget).await?;

        if dry_run {
            tracing::info!(job_id = %job.id, "Dry run: stopping before publish");
            return self.advance(job, budget, JobStatus::Completed);
        }

        self.advance(job, budget, JobStatus::Publishing)?;
        self.publish(job, budget, media_type).await?;

        self.advance(job, budget, JobStatus::SyncingRecord)?;
        self.sync_record(job, budget).await;

        self.advance(job, budget, JobStatus::Completed)
    }

    /// Resolve, stage and analyze the asset.
    async fn analyze(&self, job: &mut Job, budget: &RetryBudget, media_type: MediaType) -> Result<(), PipelineError> {
        let collaborators = &self.ctx.collaborators;
        let retry = &self.ctx.retry;

        let resolver = &collaborators.resolver;
        let source_ref = job.source_ref.as_str();
        let asset = retry
            .run(Stage::Analyzing, budget, move || resolver.resolve(source_ref))
            .await?;

        // Over-budget or unsupported assets are skipped before staging and
        // never take an analyzer slot.
        collaborators
            .analyzer
            .precheck(media_type, asset.size())
            .map_err(|err| PipelineError::from_external(Stage::Analyzing, 1, err))?;

        let key = AssetKey {
            batch_id: job.batch_id,
            job_id: job.id,
            source_ref: job.source_ref.clone(),
            extension: asset.extension(),
        };
        let store = &collaborators.store;
        let (asset_ref, key_ref) = (&asset, &key);
        let path = retry
            .run(Stage::Analyzing, budget, move || store.store(asset_ref, key_ref))
            .await?;
        tracing::debug!(job_id = %job.id, path = %path, bytes = asset.size(), "Asset staged");
        job.staged_asset_path = Some(path);
        self.snapshot(job, budget);

        let request = AnalysisRequest {
            path: job.staged_asset_path.as_deref().unwrap_or_default(),
            media_type,
            content_type: &asset.content_type,
            size_hint: asset.size(),
        };
        let analyzer = &collaborators.analyzer;
        let permits = &self.ctx.analyzer_permits;
        let request_ref = &request;
        let analysis = retry
            .run(Stage::Analyzing, budget, move || async move {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|_| ExternalError::non_retryable("analyzer", "analyzer pool closed"))?;
                analyzer.analyze(request_ref).await
            })
            .await?;

        job.analysis = Some(analysis);
        Ok(())
    }

    async fn write_copy(&self, job: &mut Job, budget: &RetryBudget, media_type: MediaType) -> Result<(), PipelineError> {
        let empty = serde_json::Value::Null;
        let brief = CopyBrief {
            analysis: job.analysis.as_ref().unwrap_or(&empty),
            angle: &job.angle,
            format: &job.format,
            messenger: &job.messenger,
            media_type,
        };
        let copywriter = &self.ctx.collaborators.copywriter;
        let brief_ref = &brief;
        let draft = self
            .ctx
            .retry
            .run(Stage::WritingCopy, budget, move || copywriter.draft(brief_ref))
            .await?;

        job.draft_copy = Some(draft);
        Ok(())
    }

    async fn review_copy(&self, job: &mut Job, budget: &RetryBudget) -> Result<(), PipelineError> {
        let draft = job
            .draft_copy
            .clone()
            .ok_or_else(|| PipelineError::Internal("no draft copy to review".to_string()))?;

        let outcome = self.consensus.review(&draft, budget).await?;

        for residual in &outcome.residual_flags {
            job.warnings
                .push(format!("revised copy still contains flagged text: \"{residual}\""));
        }
        job.final_copy = Some(outcome.final_copy);
        job.compliance_verdict = Some(outcome.compliance);
        job.domain_verdict = Some(outcome.domain);
        job.copy_revised = outcome.revised;
        Ok(())
    }

    async fn publish(&self, job: &mut Job, budget: &RetryBudget, media_type: MediaType) -> Result<(), PipelineError> {
        let copy = job
            .final_copy
            .clone()
            .ok_or_else(|| PipelineError::Internal("no final copy to publish".to_string()))?;
        let media = StagedMedia {
            path: job.staged_asset_path.clone().unwrap_or_default(),
            media_type,
        };
        let targeting = self.targeting_for(job);

        let publisher = &self.ctx.collaborators.publisher;
        let (copy_ref, media_ref, targeting_ref) = (&copy, &media, &targeting);
        let ids = self
            .ctx
            .retry
            .run(Stage::Publishing, budget, move || {
                publisher.publish(copy_ref, media_ref, targeting_ref)
            })
            .await?;

        tracing::info!(
            job_id = %job.id,
            creative_id = %ids.creative_id,
            ad_id = %ids.ad_id,
            "Published paused ad"
        );
        job.platform_ids = Some(ids);
        Ok(())
    }

    /// Best effort: failures are recorded on the job and never change status.
    async fn sync_record(&self, job: &mut Job, budget: &RetryBudget) {
        let Some(copy) = job.final_copy.clone() else {
            return;
        };
        let record = AdRecord {
            job_id: job.id,
            batch_id: job.batch_id,
            source_ref: job.source_ref.clone(),
            copy,
            platform_ids: job.platform_ids.clone(),
            status: JobStatus::Completed.label().to_string(),
        };

        let record_sync = &self.ctx.collaborators.record_sync;
        let record_ref = &record;
        let result = self
            .ctx
            .retry
            .run(Stage::SyncingRecord, budget, move || record_sync.update(record_ref))
            .await;

        if let Err(err) = result {
            tracing::warn!(job_id = %job.id, error = %err, "Record sync failed");
            job.warnings.push(format!("record sync failed: {err}"));
        }
    }

    fn targeting_for(&self, job: &Job) -> Targeting {
        let mut targeting = self.ctx.targeting.clone();
        if let Some(ad_set_id) = &job.ad_set_id {
            targeting.ad_set_id = ad_set_id.clone();
        }
        targeting
    }

    fn advance(&self, job: &mut Job, budget: &RetryBudget, next: JobStatus) -> Result<(), PipelineError> {
        let from = job.status.label();
        job.retry_count = budget.used();
        job.transition(next)
            .map_err(|e| PipelineError::Internal(e.to_string()))?;
        tracing::debug!(job_id = %job.id, batch_id = %job.batch_id, from, to = job.status.label(), "Transition");
        self.ctx.registry.upsert(job);
        Ok(())
    }

    fn snapshot(&self, job: &mut Job, budget: &RetryBudget) {
        job.retry_count = budget.used();
        self.ctx.registry.upsert(job);
    }

    fn settle_error(&self, job: &mut Job, budget: &RetryBudget, err: PipelineError) {
        let next = match &err {
            PipelineError::Skipped(reason) => JobStatus::Skipped {
                reason: reason.clone(),
            },
            PipelineError::StageFailed { stage, .. } => JobStatus::Failed {
                stage: Some(*stage),
                error: err.to_string(),
            },
            PipelineError::Internal(_) => JobStatus::Failed {
                stage: job.status.stage(),
                error: err.to_string(),
            },
        };

        if let Err(invalid) = self.advance(job, budget, next.clone()) {
            // Only reachable if the job is already terminal.
            tracing::error!(job_id = %job.id, error = %invalid, "Could not record job outcome");
            job.error.get_or_insert_with(|| err.to_string());
        }
        if matches!(next, JobStatus::Skipped { .. }) {
            tracing::info!(job_id = %job.id, reason = %err, "Job skipped");
        } else {
            tracing::warn!(job_id = %job.id, error = %err, "Job failed");
        }
    }
}

/// Counts a job in `pipeline_active_jobs` until dropped, including when the
/// job task is aborted.
struct ActiveJob;

impl ActiveJob {
    fn enter() -> Self {
        metrics::gauge!("pipeline_active_jobs").increment(1.0);
        ActiveJob
    }
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        metrics::gauge!("pipeline_active_jobs").decrement(1.0);
    }
}
